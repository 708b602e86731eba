use url::Url;

use super::PlatformMatcher;

pub struct VimeoMatcher;

fn numeric(segment: &str) -> Option<String> {
    (!segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())).then(|| segment.to_string())
}

impl PlatformMatcher for VimeoMatcher {
    fn platform(&self) -> &'static str {
        "vimeo"
    }

    fn match_url(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?.to_ascii_lowercase();
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

        match (host.as_str(), segments.as_slice()) {
            ("player.vimeo.com", ["video", id, ..]) => numeric(id),
            ("vimeo.com" | "www.vimeo.com", ["channels", _, id, ..]) => numeric(id),
            ("vimeo.com" | "www.vimeo.com", [id, ..]) => numeric(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(url: &str) -> Option<String> {
        VimeoMatcher.match_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_supported_shapes() {
        assert_eq!(id("https://vimeo.com/76979871"), Some("76979871".into()));
        assert_eq!(id("https://www.vimeo.com/76979871/"), Some("76979871".into()));
        assert_eq!(
            id("https://vimeo.com/channels/staffpicks/76979871"),
            Some("76979871".into())
        );
        assert_eq!(
            id("https://player.vimeo.com/video/76979871?h=abc"),
            Some("76979871".into())
        );
    }

    #[test]
    fn test_rejects_non_numeric() {
        assert_eq!(id("https://vimeo.com/staffpicks"), None);
        assert_eq!(id("https://vimeo.com/"), None);
        assert_eq!(id("https://player.vimeo.com/embed/123"), None);
        assert_eq!(id("https://vimeo.org/123"), None);
    }
}
