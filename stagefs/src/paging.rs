use stagefs_core::{Item, ItemPage, StagingClient, StagingError};

pub const DEFAULT_PAGE_LIMIT: u32 = 100;
pub const MAX_PAGE_LIMIT: u32 = 1000;

enum CursorState {
    Start,
    Next(String),
    Done,
}

/// Walks a listing page by page, following the server's continuation link.
pub struct PagingCursor<'a> {
    client: &'a StagingClient,
    path: String,
    recursive: bool,
    limit: u32,
    state: CursorState,
}

impl<'a> PagingCursor<'a> {
    pub fn new(client: &'a StagingClient, path: &str, recursive: bool, limit: u32) -> Self {
        Self {
            client,
            path: path.to_string(),
            recursive,
            limit,
            state: CursorState::Start,
        }
    }

    pub async fn fetch_first(&self) -> Result<ItemPage, StagingError> {
        self.client
            .list_items(&self.path, self.recursive, self.limit)
            .await
    }

    /// `None` once `page` was the last one.
    pub async fn fetch_next(&self, page: &ItemPage) -> Result<Option<ItemPage>, StagingError> {
        match page.next_page.as_deref() {
            Some(next) => Ok(Some(self.client.list_items_next(next).await?)),
            None => Ok(None),
        }
    }

    /// Stateful form of `fetch_first`/`fetch_next`, used by both the
    /// automatic and the interactive listing loops.
    pub async fn next_page(&mut self) -> Result<Option<ItemPage>, StagingError> {
        let page = match &self.state {
            CursorState::Done => return Ok(None),
            CursorState::Start => self.fetch_first().await?,
            CursorState::Next(link) => self.client.list_items_next(link).await?,
        };
        self.state = match &page.next_page {
            Some(next) => CursorState::Next(next.clone()),
            None => CursorState::Done,
        };
        Ok(Some(page))
    }

    /// Automatic mode: drains every page.
    pub async fn collect_all(mut self) -> Result<Vec<Item>, StagingError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page.items);
        }
        Ok(items)
    }
}
