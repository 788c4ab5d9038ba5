//! Writer and reader configuration.

use crate::compression::Compression;

pub const DEFAULT_DATA_PAGESIZE: usize = 1024 * 1024;
pub const DEFAULT_DICTIONARY_PAGESIZE_LIMIT: usize = 1024 * 1024;
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 1024;
pub const DEFAULT_MAX_STATISTICS_SIZE: usize = 4096;
pub const DEFAULT_BLOOM_FPP: f64 = 0.01;
pub const DEFAULT_BLOOM_NDV: u64 = 64 * 1024;
pub const DEFAULT_PAGE_INDEX_MEMORY_CAP: usize = 64 * 1024 * 1024;
pub const DEFAULT_FOOTER_READ_SIZE: usize = 64 * 1024;

/// Knobs consulted by the write path. Construct through [`WriterProperties::builder`].
#[derive(Debug, Clone)]
pub struct WriterProperties {
    pub data_pagesize: usize,
    pub dictionary_pagesize_limit: usize,
    pub write_batch_size: usize,
    pub max_statistics_size: usize,
    pub compression: Compression,
    pub dictionary_enabled: bool,
    pub bloom_enabled: bool,
    pub page_bloom_enabled: bool,
    pub bloom_fpp: f64,
    /// Expected distinct values per chunk, sizing the chunk filter.
    pub bloom_ndv: u64,
    /// Upper bound on bytes held by in-progress ColumnIndex/OffsetIndex
    /// structures; writes beyond it fail with `ResourceExhausted`.
    pub page_index_memory_cap: usize,
}

impl Default for WriterProperties {
    fn default() -> Self {
        Self {
            data_pagesize: DEFAULT_DATA_PAGESIZE,
            dictionary_pagesize_limit: DEFAULT_DICTIONARY_PAGESIZE_LIMIT,
            write_batch_size: DEFAULT_WRITE_BATCH_SIZE,
            max_statistics_size: DEFAULT_MAX_STATISTICS_SIZE,
            compression: Compression::Uncompressed,
            dictionary_enabled: false,
            bloom_enabled: true,
            page_bloom_enabled: true,
            bloom_fpp: DEFAULT_BLOOM_FPP,
            bloom_ndv: DEFAULT_BLOOM_NDV,
            page_index_memory_cap: DEFAULT_PAGE_INDEX_MEMORY_CAP,
        }
    }
}

impl WriterProperties {
    pub fn builder() -> WriterPropertiesBuilder {
        WriterPropertiesBuilder {
            props: WriterProperties::default(),
        }
    }
}

pub struct WriterPropertiesBuilder {
    props: WriterProperties,
}

impl WriterPropertiesBuilder {
    pub fn data_pagesize(mut self, v: usize) -> Self {
        self.props.data_pagesize = v.max(1);
        self
    }

    pub fn dictionary_pagesize_limit(mut self, v: usize) -> Self {
        self.props.dictionary_pagesize_limit = v;
        self
    }

    pub fn write_batch_size(mut self, v: usize) -> Self {
        self.props.write_batch_size = v.max(1);
        self
    }

    pub fn max_statistics_size(mut self, v: usize) -> Self {
        self.props.max_statistics_size = v;
        self
    }

    pub fn compression(mut self, v: Compression) -> Self {
        self.props.compression = v;
        self
    }

    pub fn dictionary_enabled(mut self, v: bool) -> Self {
        self.props.dictionary_enabled = v;
        self
    }

    pub fn bloom_enabled(mut self, v: bool) -> Self {
        self.props.bloom_enabled = v;
        self
    }

    pub fn page_bloom_enabled(mut self, v: bool) -> Self {
        self.props.page_bloom_enabled = v;
        self
    }

    pub fn bloom_fpp(mut self, v: f64) -> Self {
        self.props.bloom_fpp = v;
        self
    }

    pub fn bloom_ndv(mut self, v: u64) -> Self {
        self.props.bloom_ndv = v.max(1);
        self
    }

    pub fn page_index_memory_cap(mut self, v: usize) -> Self {
        self.props.page_index_memory_cap = v;
        self
    }

    pub fn build(self) -> WriterProperties {
        self.props
    }
}

/// Knobs consulted by the read path.
#[derive(Debug, Clone)]
pub struct ReaderProperties {
    /// Initial ranged read from the end of the file when locating the
    /// footer; enlarged once if the metadata overflows it.
    pub footer_read_size: usize,
    /// Verify page payload checksums when present.
    pub verify_checksums: bool,
}

impl Default for ReaderProperties {
    fn default() -> Self {
        Self {
            footer_read_size: DEFAULT_FOOTER_READ_SIZE,
            verify_checksums: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let props = WriterProperties::builder()
            .data_pagesize(512)
            .dictionary_enabled(true)
            .compression(Compression::Zstd)
            .bloom_ndv(0)
            .build();
        assert_eq!(props.data_pagesize, 512);
        assert!(props.dictionary_enabled);
        assert_eq!(props.compression, Compression::Zstd);
        assert_eq!(props.bloom_ndv, 1);
        assert_eq!(props.write_batch_size, DEFAULT_WRITE_BATCH_SIZE);
    }
}
