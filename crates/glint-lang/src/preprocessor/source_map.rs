//! Mapping from preprocessed output positions back to authoring positions.

/// An authoring position. `expansion` is set when the text at this
/// position was produced by a macro; the line and column are then those of
/// the outermost macro invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub file: u32,
    pub line: usize,
    pub column: usize,
    pub expansion: Option<u32>,
}

/// Start of a run of output text that maps to one source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub out_column: usize,
    pub location: Location,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    files: Vec<String>,
    lines: Vec<Vec<Segment>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file name, returning its id. Names are deduplicated.
    pub fn add_file(&mut self, name: &str) -> u32 {
        if let Some(index) = self.files.iter().position(|f| f == name) {
            return index as u32;
        }
        self.files.push(name.to_string());
        (self.files.len() - 1) as u32
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn file_name(&self, id: u32) -> &str {
        self.files
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or("<unknown>")
    }

    /// Append the segments of the next output line.
    pub fn push_line(&mut self, segments: Vec<Segment>) {
        self.lines.push(segments);
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Map a 1-based output line and column to its authoring location.
    pub fn lookup(&self, line: usize, column: usize) -> Option<Location> {
        let segments = self.lines.get(line.checked_sub(1)?)?;
        let segment = segments
            .iter()
            .rev()
            .find(|s| s.out_column <= column)
            .or_else(|| segments.first())?;
        let mut location = segment.location;
        if location.expansion.is_none() && column > segment.out_column {
            location.column += column - segment.out_column;
        }
        Some(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: usize, column: usize, expansion: Option<u32>) -> Location {
        Location {
            file: 0,
            line,
            column,
            expansion,
        }
    }

    #[test]
    fn test_lookup_offsets_within_segment() {
        let mut map = SourceMap::new();
        map.add_file("main");
        map.push_line(vec![Segment {
            out_column: 1,
            location: loc(3, 5, None),
        }]);
        assert_eq!(map.lookup(1, 4), Some(loc(3, 8, None)));
    }

    #[test]
    fn test_expanded_segment_reports_site() {
        let mut map = SourceMap::new();
        map.push_line(vec![
            Segment {
                out_column: 1,
                location: loc(7, 1, None),
            },
            Segment {
                out_column: 11,
                location: loc(7, 11, Some(0)),
            },
        ]);
        assert_eq!(map.lookup(1, 15), Some(loc(7, 11, Some(0))));
        assert_eq!(map.lookup(2, 1), None);
    }

    #[test]
    fn test_file_dedup() {
        let mut map = SourceMap::new();
        assert_eq!(map.add_file("a"), 0);
        assert_eq!(map.add_file("b"), 1);
        assert_eq!(map.add_file("a"), 0);
        assert_eq!(map.file_name(1), "b");
    }
}
