use super::NormalizeError;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// Split-declaration attributes stripped from the manifest
const SPLIT_ATTRS: &str =
    r#"\s+(?:android:)?(?:isSplitRequired|requiredSplitTypes|splitTypes|split)="[^"]*""#;

/// Meta-data entries that instruct the installer to expect split APKs
const SPLIT_METADATA: [&str; 2] = [
    "com.android.vending.splits",
    "com.android.vending.splits.required",
];

/// Counts of manifest edits
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestStats {
    pub attributes_removed: usize,
    pub elements_removed: usize,
    pub native_libs_forced: bool,
}

/// Rewrites the base manifest to declare a single monolithic package.
///
/// Removes the attributes that mark the package as a split or as
/// split-capable, drops the Play-delivery split meta-data elements, and
/// forces native-library extraction so merged `lib/` content loads.
pub struct ManifestNormalizer {
    split_attrs: Regex,
    extract_native: Regex,
}

impl ManifestNormalizer {
    pub fn new() -> Self {
        Self {
            split_attrs: Regex::new(SPLIT_ATTRS).expect("valid pattern"),
            extract_native: Regex::new(r#"android:extractNativeLibs="false""#)
                .expect("valid pattern"),
        }
    }

    /// Normalize the manifest at `path` in place
    pub fn normalize(&self, path: &Path) -> Result<ManifestStats, NormalizeError> {
        let text = std::fs::read_to_string(path).map_err(|source| NormalizeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut stats = ManifestStats::default();

        // Drop the split meta-data elements first, by byte span
        let without_metadata = self.remove_split_metadata(path, &text, &mut stats)?;

        let mut attrs = 0usize;
        let stripped = self
            .split_attrs
            .replace_all(&without_metadata, |_: &regex::Captures<'_>| {
                attrs += 1;
                String::new()
            });
        stats.attributes_removed = attrs;

        let finished = self.extract_native.replace(
            stripped.as_ref(),
            r#"android:extractNativeLibs="true""#,
        );
        stats.native_libs_forced = matches!(finished, std::borrow::Cow::Owned(_));

        if finished != text {
            debug!(
                "{}: removed {} attribute(s), {} element(s)",
                path.display(),
                stats.attributes_removed,
                stats.elements_removed
            );
            std::fs::write(path, finished.as_ref()).map_err(|source| NormalizeError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(stats)
    }

    /// Splice out `<meta-data>` elements naming the Play split manifest
    fn remove_split_metadata(
        &self,
        path: &Path,
        text: &str,
        stats: &mut ManifestStats,
    ) -> Result<String, NormalizeError> {
        let mut reader = Reader::from_str(text);
        let mut remove: Vec<(usize, usize)> = Vec::new();

        loop {
            let start_pos = reader.buffer_position();
            match reader.read_event() {
                Ok(Event::Start(e)) if e.name().as_ref() == b"meta-data" => {
                    if element_names_split(&e) {
                        reader.read_to_end(e.name()).map_err(|source| {
                            NormalizeError::Malformed {
                                path: path.to_path_buf(),
                                source,
                            }
                        })?;
                        remove.push((start_pos, reader.buffer_position()));
                    }
                }
                Ok(Event::Empty(e)) if e.name().as_ref() == b"meta-data" => {
                    if element_names_split(&e) {
                        remove.push((start_pos, reader.buffer_position()));
                    }
                }
                Ok(Event::Eof) => break,
                Err(source) => {
                    return Err(NormalizeError::Malformed {
                        path: path.to_path_buf(),
                        source,
                    })
                }
                _ => {}
            }
        }

        stats.elements_removed = remove.len();
        if remove.is_empty() {
            return Ok(text.to_string());
        }
        let mut result = String::with_capacity(text.len());
        let mut cursor = 0usize;
        for (start, end) in remove {
            result.push_str(&text[cursor..start]);
            cursor = end;
        }
        result.push_str(&text[cursor..]);
        Ok(result)
    }
}

impl Default for ManifestNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn element_names_split(e: &quick_xml::events::BytesStart<'_>) -> bool {
    for attr in e.attributes().filter_map(|a| a.ok()) {
        let key = String::from_utf8_lossy(attr.key.as_ref());
        if key == "android:name" || key.ends_with(":name") {
            let value = String::from_utf8_lossy(&attr.value);
            return SPLIT_METADATA.contains(&value.as_ref());
        }
    }
    false
}
