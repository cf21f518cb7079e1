/// Tunables of a page's storage layer.
#[derive(Clone, Copy, Debug)]
pub struct PageConfig {
    /// Maximum number of entries a B-tree node may hold.
    pub max_entries_per_node: usize,
    /// Values at or below this size are returned inline; larger values come
    /// back as streaming handles.
    pub max_inline_value_size: usize,
    /// Maximum number of entries or keys returned per snapshot page; longer
    /// listings continue through a token.
    pub max_fetch_entries: usize,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            max_entries_per_node: 32,
            max_inline_value_size: 4096,
            max_fetch_entries: 256,
        }
    }
}
