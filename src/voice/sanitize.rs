//! Text cleanup before speech synthesis

use std::sync::LazyLock;

use regex::Regex;

/// Markdown emphasis, code and heading markers
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s+|[*_~`]+").expect("valid regex"));

/// Bullet and numbered list markers at line start
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-+*]|\d{1,3}[.)])\s+").expect("valid regex"));

/// Pictographs, symbols, flags, variation selectors and joiners
static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        "[",
        r"\x{1F000}-\x{1FAFF}",
        r"\x{2600}-\x{27BF}",
        r"\x{2B00}-\x{2BFF}",
        r"\x{2300}-\x{23FF}",
        r"\x{1F1E6}-\x{1F1FF}",
        r"\x{E0020}-\x{E007F}",
        r"\x{FE00}-\x{FE0F}",
        r"\x{200D}\x{20E3}\x{3030}\x{303D}\x{3297}\x{3299}",
        "]",
    ))
    .expect("valid regex")
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Prepare reply text for a synthesizer
///
/// Strips list markers, emphasis markers and emoji, then collapses whitespace. An empty
/// result means there is nothing worth speaking.
#[must_use]
pub fn sanitize_for_speech(text: &str) -> String {
    let text = LIST_MARKER.replace_all(text, "");
    let text = EMPHASIS.replace_all(&text, "");
    let text = EMOJI.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_emphasis_markers() {
        assert_eq!(
            sanitize_for_speech("**大事** なのは _これ_ と ~~あれ~~ と `code`"),
            "大事 なのは これ と あれ と code"
        );
    }

    #[test]
    fn strips_headings() {
        assert_eq!(sanitize_for_speech("## 見出し\n本文"), "見出し 本文");
    }

    #[test]
    fn strips_list_markers() {
        assert_eq!(sanitize_for_speech("- りんご\n- みかん"), "りんご みかん");
        assert_eq!(sanitize_for_speech("1. 最初\n2) 次"), "最初 次");
        assert_eq!(sanitize_for_speech("気温は -5 度"), "気温は -5 度");
    }

    #[test]
    fn strips_emoji() {
        let cleaned = sanitize_for_speech("やったね🎉👍 すごい✨ 👨‍👩‍👧 🇯🇵");

        assert_eq!(cleaned, "やったね すごい");
    }

    #[test]
    fn keeps_japanese_punctuation() {
        assert_eq!(sanitize_for_speech("こんにちは、元気？「はい」。"), "こんにちは、元気？「はい」。");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(sanitize_for_speech("  a \n\n b\t c  "), "a b c");
    }

    #[test]
    fn emoji_only_is_empty() {
        assert!(sanitize_for_speech("😀 **🎉**").is_empty());
    }
}
