use super::NormalizeError;
use regex::Regex;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, trace};

/// Rewrites bare ampersands in resource documents to `&amp;`.
///
/// Concatenating split resource values can leave a document with `&`
/// characters that no longer begin a valid escape sequence, which the
/// resource compiler rejects. The repair is purely syntactic: a second
/// run over repaired text is a no-op.
pub struct AmpersandRepairer {
    entity: Regex,
}

impl AmpersandRepairer {
    pub fn new() -> Self {
        let entity = Regex::new(r"^&(?:amp|lt|gt|apos|quot|#[0-9]{1,7}|#x[0-9a-fA-F]{1,6});")
            .expect("valid pattern");
        Self { entity }
    }

    /// Repair one document's text, returning the fix count
    pub fn repair<'t>(&self, text: &'t str) -> (Cow<'t, str>, usize) {
        let mut out = String::new();
        let mut fixes = 0usize;
        let mut last = 0usize;

        for (i, _) in text.match_indices('&') {
            if self.entity.is_match(&text[i..]) {
                continue;
            }
            out.push_str(&text[last..i]);
            out.push_str("&amp;");
            last = i + 1;
            fixes += 1;
        }

        if fixes == 0 {
            return (Cow::Borrowed(text), 0);
        }
        out.push_str(&text[last..]);
        (Cow::Owned(out), fixes)
    }

    /// Repair every XML document under the resource directory
    pub fn repair_tree(&self, res_dir: &Path) -> Result<usize, NormalizeError> {
        let mut fixes = 0usize;
        if !res_dir.exists() {
            return Ok(0);
        }

        for entry in walkdir::WalkDir::new(res_dir) {
            let entry = entry.map_err(|source| NormalizeError::Walk {
                path: res_dir.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_xml = entry
                .path()
                .extension()
                .map(|e| e.eq_ignore_ascii_case("xml"))
                .unwrap_or(false);
            if !is_xml {
                continue;
            }

            let text = std::fs::read_to_string(entry.path()).map_err(|source| {
                NormalizeError::Io {
                    path: entry.path().to_path_buf(),
                    source,
                }
            })?;
            let (repaired, count) = self.repair(&text);
            if count > 0 {
                trace!("{}: {} ampersand fix(es)", entry.path().display(), count);
                std::fs::write(entry.path(), repaired.as_ref()).map_err(|source| {
                    NormalizeError::Io {
                        path: entry.path().to_path_buf(),
                        source,
                    }
                })?;
                fixes += count;
            }
        }

        if fixes > 0 {
            debug!("Repaired {} bare ampersand(s)", fixes);
        }
        Ok(fixes)
    }
}

impl Default for AmpersandRepairer {
    fn default() -> Self {
        Self::new()
    }
}
