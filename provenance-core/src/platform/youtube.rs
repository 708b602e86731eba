use url::Url;

use super::PlatformMatcher;

pub struct YouTubeMatcher;

const VIDEO_ID_LEN: usize = 11;

fn is_video_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn is_youtube_host(host: &str) -> bool {
    matches!(
        host,
        "youtube.com" | "www.youtube.com" | "m.youtube.com" | "music.youtube.com"
    )
}

impl PlatformMatcher for YouTubeMatcher {
    fn platform(&self) -> &'static str {
        "youtube"
    }

    fn match_url(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?.to_ascii_lowercase();
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

        let candidate = if host == "youtu.be" {
            segments.next()?.to_string()
        } else if host == "youtube-nocookie.com" || host == "www.youtube-nocookie.com" {
            match (segments.next()?, segments.next()) {
                ("embed", Some(id)) => id.to_string(),
                _ => return None,
            }
        } else if is_youtube_host(&host) {
            match segments.next()? {
                "watch" => url
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned())?,
                "embed" | "shorts" | "live" | "v" => segments.next()?.to_string(),
                _ => return None,
            }
        } else {
            return None;
        };

        is_video_id(&candidate).then_some(candidate)
    }
}
