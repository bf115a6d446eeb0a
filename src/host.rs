/// Browser tab operations the core delegates to the host
use crate::error::Result;
use crate::tab_data::TabInfo;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which windows to collect tabs from when saving
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TabScope {
    #[default]
    CurrentWindow,
    AllWindows,
}

#[async_trait(?Send)]
pub trait TabHost {
    /// Unpinned tabs in the given scope
    async fn query_tabs(&self, scope: TabScope) -> Result<Vec<TabInfo>>;

    async fn open_tab(&self, url: &str) -> Result<()>;

    /// Opened before closing saved tabs so the window survives
    async fn open_new_tab_page(&self) -> Result<()>;

    async fn close_tabs(&self, ids: &[i32]) -> Result<()>;
}
