use rust_htslib::bam::{Header, HeaderView};
use std::str;

use crate::utils::errors::RecalError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigRecord {
    pub name: String,
    pub length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Coordinate,
    Queryname,
    Unsorted,
    Unknown,
}

impl SortOrder {
    fn parse(value: &str) -> SortOrder {
        match value {
            "coordinate" => SortOrder::Coordinate,
            "queryname" => SortOrder::Queryname,
            "unsorted" => SortOrder::Unsorted,
            _ => SortOrder::Unknown,
        }
    }
}

/**
 * The header of the read collection being recalibrated: the raw SAM header text plus the
 * parts of it the engine consults. It is read once per job and shared by every reader and
 * writer, so it holds plain owned data rather than an htslib handle.
 */
#[derive(Debug, Clone)]
pub struct CollectionHeader {
    text: Vec<u8>,
    contigs: Vec<ContigRecord>,
    read_groups: Vec<String>,
    sort_order: SortOrder,
}

impl CollectionHeader {
    pub fn from_header_view(view: &HeaderView) -> Result<CollectionHeader, RecalError> {
        let mut contigs = Vec::with_capacity(view.target_count() as usize);
        for (tid, name) in view.target_names().into_iter().enumerate() {
            let name = str::from_utf8(name).map_err(|e| {
                RecalError::input(format!("Contig name in header is not UTF-8: {}", e))
            })?;
            contigs.push(ContigRecord {
                name: name.to_string(),
                length: view.target_len(tid as u32).unwrap_or(0) as usize,
            });
        }

        let text = view.as_bytes().to_vec();
        let (read_groups, sort_order) = Self::parse_header_lines(&text)?;

        Ok(CollectionHeader {
            text,
            contigs,
            read_groups,
            sort_order,
        })
    }

    /// Parse SAM header text, e.g. as produced by `samtools view -H`
    pub fn from_text(text: &[u8]) -> Result<CollectionHeader, RecalError> {
        let view = HeaderView::from_bytes(text);
        Self::from_header_view(&view)
    }

    fn parse_header_lines(text: &[u8]) -> Result<(Vec<String>, SortOrder), RecalError> {
        let text = str::from_utf8(text)
            .map_err(|e| RecalError::input(format!("Header text is not UTF-8: {}", e)))?;

        let mut read_groups = Vec::new();
        let mut sort_order = SortOrder::Unknown;
        for line in text.lines() {
            let mut fields = line.split('\t');
            match fields.next() {
                Some("@HD") => {
                    if let Some(so) = fields.find_map(|f| f.strip_prefix("SO:")) {
                        sort_order = SortOrder::parse(so);
                    }
                }
                Some("@RG") => {
                    if let Some(id) = fields.find_map(|f| f.strip_prefix("ID:")) {
                        read_groups.push(id.to_string());
                    }
                }
                _ => continue,
            }
        }

        Ok((read_groups, sort_order))
    }

    /**
     * A fresh htslib header for a writer. Each writer gets its own copy so every output
     * collection carries the full header.
     */
    pub fn to_htslib_header(&self) -> Header {
        let view = HeaderView::from_bytes(&self.text);
        Header::from_template(&view)
    }

    pub fn contigs(&self) -> &[ContigRecord] {
        &self.contigs
    }

    pub fn tid(&self, name: &str) -> Option<usize> {
        self.contigs.iter().position(|contig| contig.name == name)
    }

    pub fn contig_name(&self, tid: usize) -> Option<&str> {
        self.contigs.get(tid).map(|contig| contig.name.as_str())
    }

    pub fn read_groups(&self) -> &[String] {
        &self.read_groups
    }

    pub fn has_read_group(&self, read_group: &str) -> bool {
        self.read_groups.iter().any(|rg| rg == read_group)
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    /**
     * Two headers describe the same collection schema when their sequence dictionaries and
     * read groups agree. Program records and comments are ignored.
     */
    pub fn same_schema(&self, other: &CollectionHeader) -> bool {
        self.contigs == other.contigs && self.read_groups == other.read_groups
    }
}
