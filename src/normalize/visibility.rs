use super::NormalizeError;
use crate::catalog::{PlaceholderPattern, PublicTable, ResourceId};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// Counts of publicized entries
#[derive(Debug, Default, Clone, Copy)]
pub struct VisibilityStats {
    pub publicized: usize,
    pub skipped: usize,
}

/// Forces every resource entry public before a rebuild.
///
/// An entry is public iff it is listed in the tree's public-identifier
/// table; a resource private to one split may now be referenced from
/// content that came from another, so every definition missing from the
/// table gets an entry appended. Ids are allocated after the highest
/// existing id of the same package and type; a type with no existing
/// entries offers no id space to extend and is skipped. Additive and
/// idempotent: existing entries are never removed or renumbered.
pub struct VisibilityNormalizer<'a> {
    pattern: &'a PlaceholderPattern,
}

impl<'a> VisibilityNormalizer<'a> {
    pub fn new(pattern: &'a PlaceholderPattern) -> Self {
        Self { pattern }
    }

    /// Publicize every resource defined under `res_dir`.
    ///
    /// A tree without a public table is left alone: nothing was
    /// visibility-tracked to begin with.
    pub fn publicize(&self, res_dir: &Path) -> Result<VisibilityStats, NormalizeError> {
        let table_path = res_dir.join("values").join("public.xml");
        if !table_path.exists() {
            return Ok(VisibilityStats::default());
        }

        let table = PublicTable::parse(&table_path, self.pattern)?;
        let mut public: HashSet<(String, String)> = HashSet::new();
        // Next free entry index per resource type, keyed by type name
        let mut id_space: HashMap<String, (u8, u8, u16)> = HashMap::new();
        for entry in &table.entries {
            public.insert((entry.res_type.clone(), entry.name.clone()));
            let space = id_space.entry(entry.res_type.clone()).or_insert((
                entry.id.package(),
                entry.id.type_id(),
                0,
            ));
            if entry.id.entry() > space.2 {
                space.2 = entry.id.entry();
            }
        }

        let defined = self.collect_definitions(res_dir)?;

        let mut stats = VisibilityStats::default();
        let mut additions = String::new();
        for (res_type, name) in &defined {
            if public.contains(&(res_type.clone(), name.clone())) {
                continue;
            }
            match id_space.get_mut(res_type) {
                Some((package, type_id, max_entry)) if *max_entry < u16::MAX => {
                    *max_entry += 1;
                    let id = ResourceId::from_parts(*package, *type_id, *max_entry);
                    additions.push_str(&format!(
                        "    <public type=\"{res_type}\" name=\"{name}\" id=\"{id}\" />\n"
                    ));
                    stats.publicized += 1;
                }
                _ => {
                    warn!("No id space for type {:?}, leaving {:?} private", res_type, name);
                    stats.skipped += 1;
                }
            }
        }

        if stats.publicized > 0 {
            let text = std::fs::read_to_string(&table_path).map_err(|source| {
                NormalizeError::Io {
                    path: table_path.clone(),
                    source,
                }
            })?;
            let close = text
                .rfind("</resources>")
                .ok_or_else(|| NormalizeError::MalformedValues(table_path.clone()))?;
            let mut result = String::with_capacity(text.len() + additions.len());
            result.push_str(&text[..close]);
            result.push_str(&additions);
            result.push_str(&text[close..]);
            std::fs::write(&table_path, result).map_err(|source| NormalizeError::Io {
                path: table_path.clone(),
                source,
            })?;
            debug!("Publicized {} resource entr(ies)", stats.publicized);
        }
        Ok(stats)
    }

    /// All (type, name) pairs defined in the tree's values documents
    fn collect_definitions(
        &self,
        res_dir: &Path,
    ) -> Result<BTreeSet<(String, String)>, NormalizeError> {
        let mut defined = BTreeSet::new();

        let entries = std::fs::read_dir(res_dir).map_err(|source| NormalizeError::Io {
            path: res_dir.to_path_buf(),
            source,
        })?;
        for dir_entry in entries.filter_map(|e| e.ok()) {
            let dir_path = dir_entry.path();
            let dir_name = dir_entry.file_name().to_string_lossy().to_string();
            if !dir_path.is_dir() || !dir_name.starts_with("values") {
                continue;
            }
            let files = std::fs::read_dir(&dir_path).map_err(|source| NormalizeError::Io {
                path: dir_path.clone(),
                source,
            })?;
            for file in files.filter_map(|e| e.ok()) {
                let path = file.path();
                let is_xml = path
                    .extension()
                    .map(|e| e.eq_ignore_ascii_case("xml"))
                    .unwrap_or(false);
                if !is_xml || path.file_name().is_some_and(|f| f == "public.xml") {
                    continue;
                }
                self.scan_values_file(&path, &mut defined)?;
            }
        }
        Ok(defined)
    }

    fn scan_values_file(
        &self,
        path: &Path,
        defined: &mut BTreeSet<(String, String)>,
    ) -> Result<(), NormalizeError> {
        let text = std::fs::read_to_string(path).map_err(|source| NormalizeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = Reader::from_str(&text);
        let mut depth = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if depth == 1 {
                        record_definition(&e, defined);
                    }
                    depth += 1;
                }
                Ok(Event::Empty(e)) => {
                    if depth == 1 {
                        record_definition(&e, defined);
                    }
                }
                Ok(Event::End(_)) => depth = depth.saturating_sub(1),
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
        Ok(())
    }
}

fn record_definition(
    e: &quick_xml::events::BytesStart<'_>,
    defined: &mut BTreeSet<(String, String)>,
) {
    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let mut name = None;
    let mut type_attr = None;
    for attr in e.attributes().filter_map(|a| a.ok()) {
        match attr.key.as_ref() {
            b"name" => name = Some(String::from_utf8_lossy(&attr.value).to_string()),
            b"type" => type_attr = Some(String::from_utf8_lossy(&attr.value).to_string()),
            _ => {}
        }
    }

    let res_type = match tag.as_str() {
        "string" => Some("string"),
        "color" => Some("color"),
        "dimen" => Some("dimen"),
        "style" => Some("style"),
        "string-array" => Some("array"),
        "integer-array" => Some("array"),
        "array" => Some("array"),
        "plurals" => Some("plurals"),
        "bool" => Some("bool"),
        "integer" => Some("integer"),
        "attr" => Some("attr"),
        "declare-styleable" => Some("styleable"),
        "item" => type_attr.as_deref(),
        _ => None,
    };

    if let (Some(res_type), Some(name)) = (res_type, name) {
        defined.insert((res_type.to_string(), name));
    }
}
