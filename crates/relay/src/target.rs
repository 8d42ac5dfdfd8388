//! Extraction of the `site:` directive from pull request descriptions.

use crate::TargetSite;

const DIRECTIVE: &str = "site:";

/// Returns the target site named in a pull request body.
///
/// The body is split on `\r\n` and scanned in order. The first line that
/// contains `site:` (in any letter case) decides: the text after its first
/// `:` is lowercased and trimmed. Later `site:` lines are ignored, and a
/// first match with nothing after the colon yields `None`.
pub fn extract_target(body: &str) -> Option<TargetSite> {
    let line = body
        .split("\r\n")
        .find(|line| line.to_lowercase().contains(DIRECTIVE))?;
    let (_, value) = line.split_once(':')?;
    TargetSite::new(value.trim().to_lowercase())
}
