use regex::Regex;

use super::model::JobError;

/// Accepts only URLs the extraction tool is configured for
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    pattern: Regex,
}

impl UrlPolicy {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// Returns the trimmed URL, or `InvalidInput`
    pub fn check(&self, raw: &str) -> Result<String, JobError> {
        let url = raw.trim();
        if url.is_empty() {
            return Err(JobError::InvalidInput(
                "Please provide a YouTube URL".to_string(),
            ));
        }
        if !self.pattern.is_match(url) {
            return Err(JobError::InvalidInput(
                "Invalid YouTube URL format".to_string(),
            ));
        }
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobConfig;

    fn policy() -> UrlPolicy {
        UrlPolicy::new(&JobConfig::default().url_pattern).unwrap()
    }

    #[test]
    fn test_accepts_known_hosts() {
        let policy = policy();
        for url in [
            "https://youtu.be/abc123",
            "https://www.youtube.com/watch?v=abc123",
            "http://youtube.com/shorts/abc",
            "youtu.be/abc123",
            "  https://youtu.be/abc123  ",
        ] {
            assert!(policy.check(url).is_ok(), "{url}");
        }
        assert_eq!(
            policy.check(" https://youtu.be/abc123 ").unwrap(),
            "https://youtu.be/abc123"
        );
    }

    #[test]
    fn test_rejects_garbage() {
        let policy = policy();
        assert_eq!(
            policy.check("   "),
            Err(JobError::InvalidInput("Please provide a YouTube URL".into()))
        );
        for url in [
            "not a url",
            "https://vimeo.com/123",
            "https://youtube.com/",
            "ftp://youtube.com/watch?v=x",
        ] {
            assert_eq!(
                policy.check(url),
                Err(JobError::InvalidInput("Invalid YouTube URL format".into())),
                "{url}"
            );
        }
    }
}
