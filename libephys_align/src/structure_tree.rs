// The structure tree is the brain-region taxonomy shipped alongside the atlas. Label
// volumes store atlas-native region IDs, but colour lookups work on row position in the
// tree, so every row keeps both. The ID -> row map is built once at load.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use fxhash::FxHashMap;

use super::error::{StructureTreeError, UnknownRegionError};

const ID_COLUMN: &str = "id";
const ACRONYM_COLUMN: &str = "acronym";
const NAME_COLUMN: &str = "name";
const COLOR_COLUMN: &str = "color_hex_triplet";

/// Colour used for rows that do not carry a colour triplet
const DEFAULT_RGB: [u8; 3] = [0, 0, 0];

/// One region of the structure tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureRow {
    pub id: i64,
    pub acronym: String,
    pub name: String,
    pub row_index: usize,
    pub rgb: [u8; 3],
}

/// Read-only region table keyed by atlas-native ID
#[derive(Debug, Clone, Default)]
pub struct StructureTree {
    rows: Vec<StructureRow>,
    index: FxHashMap<i64, usize>,
}

/// Split one CSV line, honouring double-quoted fields (and "" escapes inside them)
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_color(line_number: usize, hex: &str) -> Result<[u8; 3], StructureTreeError> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.is_empty() {
        return Ok(DEFAULT_RGB);
    }
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(StructureTreeError::BadColor(line_number, hex.to_string()));
    }
    let mut rgb = [0u8; 3];
    for (channel, value) in rgb.iter_mut().enumerate() {
        *value = u8::from_str_radix(&hex[channel * 2..channel * 2 + 2], 16)
            .map_err(|_| StructureTreeError::BadColor(line_number, hex.to_string()))?;
    }
    Ok(rgb)
}

impl StructureTree {
    /// Load the structure tree from a CSV file with a header row
    pub fn from_csv_file(path: &Path) -> Result<Self, StructureTreeError> {
        let mut contents = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut contents)?;
        let tree = Self::from_csv_str(&contents)?;
        spdlog::info!(
            "Loaded structure tree with {} regions from {}",
            tree.len(),
            path.display()
        );
        Ok(tree)
    }

    /// Parse the structure tree from CSV text. Columns are located by header name.
    pub fn from_csv_str(contents: &str) -> Result<Self, StructureTreeError> {
        // (1-based line number, text), skipping blank lines
        let mut lines = contents
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line))
            .filter(|(_, line)| !line.trim().is_empty());
        let header = split_csv_line(lines.next().map(|(_, line)| line).unwrap_or_default());
        let column = |name: &'static str| {
            header
                .iter()
                .position(|h| h.trim() == name)
                .ok_or(StructureTreeError::MissingColumn(name))
        };
        let id_col = column(ID_COLUMN)?;
        let acronym_col = column(ACRONYM_COLUMN)?;
        let name_col = column(NAME_COLUMN)?;
        let color_col = column(COLOR_COLUMN).ok();

        let mut rows = Vec::new();
        for (row_index, (line_number, line)) in lines.enumerate() {
            let entries = split_csv_line(line);
            if entries.len() != header.len() {
                return Err(StructureTreeError::BadFileFormat(line_number));
            }
            let rgb = match color_col {
                Some(col) => parse_color(line_number, &entries[col])?,
                None => DEFAULT_RGB,
            };
            rows.push(StructureRow {
                id: entries[id_col].trim().parse()?,
                acronym: entries[acronym_col].clone(),
                name: entries[name_col].clone(),
                row_index,
                rgb,
            });
        }
        Self::from_rows(rows)
    }

    /// Build the tree from rows; each row's `row_index` is reset to its position
    pub fn from_rows(mut rows: Vec<StructureRow>) -> Result<Self, StructureTreeError> {
        let mut index = FxHashMap::default();
        for (position, row) in rows.iter_mut().enumerate() {
            row.row_index = position;
            if index.insert(row.id, position).is_some() {
                return Err(StructureTreeError::DuplicateId(row.id));
            }
        }
        Ok(Self { rows, index })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[StructureRow] {
        &self.rows
    }

    /// Row index for an atlas-native region ID
    pub fn row_index(&self, id: i64) -> Result<usize, UnknownRegionError> {
        self.index.get(&id).copied().ok_or(UnknownRegionError(id))
    }

    /// Full row for an atlas-native region ID
    pub fn lookup(&self, id: i64) -> Result<&StructureRow, UnknownRegionError> {
        Ok(&self.rows[self.row_index(id)?])
    }

    /// Colour palette indexed by row
    pub fn palette(&self) -> Vec<[u8; 3]> {
        self.rows.iter().map(|row| row.rgb).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE_CSV: &str = "\
id,atlas_id,name,acronym,color_hex_triplet
0,0,void,void,000000
997,-1,root,root,FFFFFF
8,0,Basic cell groups and regions,grey,BFDAE3
329,41,\"Primary somatosensory area, barrel field\",SSp-bfd,188064
";

    #[test]
    fn test_parse_tree() {
        let tree = StructureTree::from_csv_str(TREE_CSV).unwrap();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.row_index(997).unwrap(), 1);
        let barrel = tree.lookup(329).unwrap();
        assert_eq!(barrel.name, "Primary somatosensory area, barrel field");
        assert_eq!(barrel.acronym, "SSp-bfd");
        assert_eq!(barrel.row_index, 3);
        assert_eq!(barrel.rgb, [0x18, 0x80, 0x64]);
        assert_eq!(tree.palette()[1], [255, 255, 255]);
    }

    #[test]
    fn test_unknown_id() {
        let tree = StructureTree::from_csv_str(TREE_CSV).unwrap();
        assert_eq!(tree.row_index(12345), Err(UnknownRegionError(12345)));
    }

    #[test]
    fn test_missing_column_and_duplicates() {
        match StructureTree::from_csv_str("id,name\n1,a\n") {
            Err(StructureTreeError::MissingColumn(col)) => assert_eq!(col, "acronym"),
            other => panic!("unexpected result {other:?}"),
        }
        match StructureTree::from_csv_str("id,name,acronym\n1,a,A\n1,b,B\n") {
            Err(StructureTreeError::DuplicateId(id)) => assert_eq!(id, 1),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_errors_report_file_lines() {
        let csv = "id,acronym,name,color_hex_triplet\n\n997,root,root,FFFFFF\n\n8,grey\n";
        match StructureTree::from_csv_str(csv) {
            Err(StructureTreeError::BadFileFormat(line)) => assert_eq!(line, 5),
            other => panic!("unexpected result {other:?}"),
        }
        let csv = "id,acronym,name,color_hex_triplet\n997,root,root,FFFFFF\n8,grey,grey,XYZ\n";
        match StructureTree::from_csv_str(csv) {
            Err(StructureTreeError::BadColor(line, hex)) => {
                assert_eq!(line, 3);
                assert_eq!(hex, "XYZ");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_quoted_quotes() {
        let fields = split_csv_line("1,\"say \"\"hi\"\", ok\",x");
        assert_eq!(fields, vec!["1", "say \"hi\", ok", "x"]);
    }
}
