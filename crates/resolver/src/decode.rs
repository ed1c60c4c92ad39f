use async_trait::async_trait;
use url::Url;

use crate::error::DecodeError;
use crate::scan::ManifestScanner;

/// Turns an inline player script into a manifest URL.
///
/// Sites that obfuscate their player configuration supply their own
/// implementation; the resolver treats it as a black box.
#[async_trait]
pub trait ScriptDecoder: Send + Sync {
    /// `Ok(None)` means the script holds no manifest reference.
    async fn decode(&self, script: &str, page_url: &Url) -> Result<Option<String>, DecodeError>;
}

/// Decoder for players that embed the manifest URL in plain or JSON-escaped form.
#[derive(Debug, Clone, Default)]
pub struct PatternScriptDecoder {
    scanner: ManifestScanner,
}

impl PatternScriptDecoder {
    pub fn new(scanner: ManifestScanner) -> Self {
        Self { scanner }
    }
}

#[async_trait]
impl ScriptDecoder for PatternScriptDecoder {
    async fn decode(&self, script: &str, _page_url: &Url) -> Result<Option<String>, DecodeError> {
        Ok(self.scanner.find_loose(script).map(String::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decodes_escaped_playlist() {
        let decoder = PatternScriptDecoder::default();
        let page = Url::parse("https://player.example/embed/1").unwrap();
        let script = r#"window.masterPlaylist = {"url":"https:\/\/vix.example\/playlist\/9.m3u8?b=1"};"#;
        assert_eq!(
            decoder.decode(script, &page).await.unwrap().as_deref(),
            Some("https://vix.example/playlist/9.m3u8?b=1")
        );
        assert_eq!(decoder.decode("var x = 1;", &page).await.unwrap(), None);
    }
}
