use std::path::Path;

const TAG_PREFIX: &str = "ctag-";
const MAX_TAG_LEN: usize = 255;

/// File name of the running executable, for consumer tags
pub(crate) fn process_name() -> String {
    std::env::args_os()
        .next()
        .and_then(|arg0| {
            Path::new(&arg0)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "ripcord".to_string())
}

/// `ctag-<process>-<seq>`, with the process part cut so the tag fits in a
/// short string
pub(crate) fn consumer_tag(process: &str, seq: u64) -> String {
    let suffix = format!("-{seq}");
    let budget = MAX_TAG_LEN - TAG_PREFIX.len() - suffix.len();

    let mut end = process.len().min(budget);
    while !process.is_char_boundary(end) {
        end -= 1;
    }

    format!("{TAG_PREFIX}{}{suffix}", &process[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_format() {
        assert_eq!(consumer_tag("worker", 7), "ctag-worker-7");
    }

    #[test]
    fn test_long_process_name_is_truncated() {
        let name = "w".repeat(400);
        let tag = consumer_tag(&name, u64::MAX);

        assert_eq!(tag.len(), MAX_TAG_LEN);
        assert!(tag.starts_with("ctag-www"));
        assert!(tag.ends_with(&format!("-{}", u64::MAX)));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let name = "é".repeat(200);
        let tag = consumer_tag(&name, 1);

        assert!(tag.len() <= MAX_TAG_LEN);
        assert!(tag.ends_with("-1"));
    }

    #[test]
    fn test_process_name_is_not_empty() {
        assert!(!process_name().is_empty());
    }
}
