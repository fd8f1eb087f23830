use crate::error::VpcError;
use crate::record::RecordTag;
use crate::storage::VpcStorage;

/// Paged reader over the append-only log, used during replay.
///
/// A fetch always starts at the requested index and fills one page-sized
/// buffer. Later requests that fall in the same page (`index / page_size`)
/// are served from that buffer, so a forward scan over records of mixed
/// length touches storage roughly once per page.
pub struct ChunkedLogReader<'a, S: ?Sized> {
    storage: &'a S,
    buffer: Vec<u8>,
    start: u64,
    len: usize,
    eof: bool,
    page: Option<u64>,
}

impl<'a, S: VpcStorage + ?Sized> ChunkedLogReader<'a, S> {
    /// `page_size` is raised to the largest record size when smaller, so a
    /// re-aligned buffer can always hold one whole record.
    pub fn new(storage: &'a S, page_size: usize) -> Self {
        Self {
            storage,
            buffer: vec![0; page_size.max(RecordTag::MAX_SIZE)],
            start: 0,
            len: 0,
            eof: false,
            page: None,
        }
    }

    pub fn page_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn page_of(&self, index: u64) -> u64 {
        index / self.buffer.len() as u64
    }

    /// The cached bytes holding `index`, fetching a new page only when
    /// `index` lies in a different page than the last fetch.
    pub fn get_buffered(&mut self, index: u64) -> Result<&[u8], VpcError> {
        if self.page != Some(self.page_of(index)) {
            self.fill(index)?;
        }
        Ok(self.buffer())
    }

    /// Force a fetch that starts exactly at `index`. Used when a record
    /// straddles the end of the cached bytes.
    pub fn slide_buffer_to_index(&mut self, index: u64) -> Result<(), VpcError> {
        self.fill(index)
    }

    /// Valid bytes of the last fetch.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Log offset of `buffer()[0]`.
    pub fn buffer_start(&self) -> u64 {
        self.start
    }

    /// The last fetch came back short because the log ended.
    pub fn end_of_file_reached(&self) -> bool {
        self.eof && self.len < self.buffer.len()
    }

    /// True only when the last fetch was a short read at end of log and
    /// `index` is at or past its last valid byte. An ordinary page boundary
    /// with more data behind it is never reported as end of file.
    pub fn buffer_and_index_are_at_end_of_file(&self, index: u64) -> bool {
        let Some(page) = self.page else {
            return false;
        };
        if self.page_of(index) < page || !self.end_of_file_reached() {
            return false;
        }
        index + 1 >= self.start + self.len as u64
    }

    fn fill(&mut self, index: u64) -> Result<(), VpcError> {
        let read = self.storage.read_chunk(&mut self.buffer, index)?;
        self.start = index;
        self.len = read.len;
        self.eof = read.eof;
        self.page = Some(self.page_of(index));
        Ok(())
    }
}
