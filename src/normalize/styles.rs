use super::NormalizeError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Removes duplicate `<item>` entries inside `<style>` elements.
///
/// Merged style tables can carry two items with the same name inside one
/// style, which the resource compiler rejects. The first entry is kept,
/// matching the engine's general first-wins duplicate policy. May alter
/// app visuals when the duplicates carried different values.
pub struct StyleDeduper;

impl StyleDeduper {
    pub fn new() -> Self {
        Self
    }

    /// Dedup the style table at `path`, returning the drop count.
    ///
    /// A missing file is a no-op: not every package defines styles.
    pub fn dedup(&self, path: &Path) -> Result<usize, NormalizeError> {
        if !path.exists() {
            return Ok(0);
        }
        let text = std::fs::read_to_string(path).map_err(|source| NormalizeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut reader = Reader::from_str(&text);
        let mut remove: Vec<(usize, usize)> = Vec::new();
        let mut depth = 0usize;
        let mut in_style = false;
        let mut item_names: HashSet<String> = HashSet::new();

        loop {
            let start_pos = reader.buffer_position();
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if depth == 1 && e.name().as_ref() == b"style" {
                        in_style = true;
                        item_names.clear();
                    } else if in_style && depth == 2 && e.name().as_ref() == b"item" {
                        if let Some(name) = attr_value(&e, b"name") {
                            if !item_names.insert(name) {
                                reader.read_to_end(e.name()).map_err(|source| {
                                    NormalizeError::Malformed {
                                        path: path.to_path_buf(),
                                        source,
                                    }
                                })?;
                                remove.push((start_pos, reader.buffer_position()));
                                continue;
                            }
                        }
                    }
                    depth += 1;
                }
                Ok(Event::Empty(e)) => {
                    if in_style && depth == 2 && e.name().as_ref() == b"item" {
                        if let Some(name) = attr_value(&e, b"name") {
                            if !item_names.insert(name) {
                                remove.push((start_pos, reader.buffer_position()));
                            }
                        }
                    }
                }
                Ok(Event::End(e)) => {
                    depth = depth.saturating_sub(1);
                    if depth == 1 && e.name().as_ref() == b"style" {
                        in_style = false;
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

        if remove.is_empty() {
            return Ok(0);
        }
        let dropped = remove.len();
        let mut result = String::with_capacity(text.len());
        let mut cursor = 0usize;
        for (start, end) in remove {
            result.push_str(&text[cursor..start]);
            cursor = end;
        }
        result.push_str(&text[cursor..]);
        std::fs::write(path, result).map_err(|source| NormalizeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("{}: dropped {} duplicate style item(s)", path.display(), dropped);
        Ok(dropped)
    }
}

impl Default for StyleDeduper {
    fn default() -> Self {
        Self::new()
    }
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}
