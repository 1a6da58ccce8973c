//! Markdown → WhatsApp text converter.
//!
//! WhatsApp renders its own lightweight markup (`*bold*`, `_italic_`,
//! `~strike~`, ```` ```mono``` ````). Assistant replies arrive in standard
//! Markdown, so the common constructs are rewritten before sending.
//!
//! Supported conversions:
//! - Bold (`**x**`, `__x__`) → `*x*`
//! - Strikethrough (`~~x~~`) → `~x~`
//! - Headers (`# Title`) → `*Title*`
//! - Links `[text](url)` → `text (url)`
//! - Code blocks keep their fences, contents untouched

use std::sync::LazyLock;

use regex::Regex;

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:\w+)?\n?(.*?)```").expect("valid regex"));
static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+?)\s*#*$").expect("valid regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid regex"));
static BOLD_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"));
static BOLD_UNDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__(.+?)__").expect("valid regex"));
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.+?)~~").expect("valid regex"));

/// Convert Markdown text to WhatsApp markup.
pub fn markdown_to_whatsapp(text: &str) -> String {
    // 1. Protect code blocks
    let mut code_blocks: Vec<String> = Vec::new();
    let text = CODE_BLOCK.replace_all(text, |caps: &regex::Captures| {
        let idx = code_blocks.len();
        code_blocks.push(caps[1].to_string());
        format!("\x00CB{idx}\x00")
    });

    // 2. Headers become bold lines
    let text = HEADER.replace_all(&text, "**$1**");

    // 3. Links
    let text = LINK.replace_all(&text, "$1 ($2)");

    // 4. Bold, then strikethrough
    let text = BOLD_STAR.replace_all(&text, "*$1*");
    let text = BOLD_UNDER.replace_all(&text, "*$1*");
    let text = STRIKE.replace_all(&text, "~$1~");

    // 5. Restore code blocks
    let mut text = text.into_owned();
    for (idx, code) in code_blocks.iter().enumerate() {
        text = text.replace(&format!("\x00CB{idx}\x00"), &format!("```{code}```"));
    }

    text
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
