/// chrome.storage and chrome.tabs access through the JS glue in bridge.js
use crate::error::{Result, StoreError, TagError};
use crate::host::{TabHost, TabScope};
use crate::storage::KeyValueStore;
use crate::tab_data::TabInfo;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;

#[wasm_bindgen(module = "/bridge.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getStorage(keys: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setStorage(items: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryTabs(all_windows: bool) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn openTab(url: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn openNewTabPage() -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn closeTabs(tab_ids: js_sys::Array) -> Result<(), JsValue>;
}

/// Plain objects instead of JS `Map`s, so chrome.storage can persist them
fn to_js<T: Serialize + ?Sized>(value: &T) -> std::result::Result<JsValue, String> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| e.to_string())
}

/// chrome.storage.local
#[derive(Debug, Default)]
pub struct ChromeStorage;

#[async_trait(?Send)]
impl KeyValueStore for ChromeStorage {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError> {
        let keys = to_js(keys).map_err(StoreError::Read)?;
        let result = getStorage(keys)
            .await
            .map_err(|e| StoreError::Read(format!("{:?}", e)))?;

        if result.is_undefined() || result.is_null() {
            return Ok(Map::new());
        }
        serde_wasm_bindgen::from_value(result).map_err(|e| StoreError::Read(e.to_string()))
    }

    async fn set(&self, entries: Map<String, Value>) -> Result<(), StoreError> {
        let items = to_js(&entries).map_err(StoreError::Write)?;
        setStorage(items)
            .await
            .map_err(|e| StoreError::Write(format!("{:?}", e)))
    }
}

/// chrome.tabs
#[derive(Debug, Default)]
pub struct ChromeTabs;

fn host_error(e: JsValue) -> TagError {
    TagError::Host(format!("{:?}", e))
}

#[async_trait(?Send)]
impl TabHost for ChromeTabs {
    async fn query_tabs(&self, scope: TabScope) -> Result<Vec<TabInfo>> {
        let tabs_js = queryTabs(scope == TabScope::AllWindows)
            .await
            .map_err(host_error)?;
        let tabs: Vec<TabInfo> =
            serde_wasm_bindgen::from_value(tabs_js).map_err(|e| TagError::Host(e.to_string()))?;
        Ok(tabs.into_iter().filter(|t| !t.pinned).collect())
    }

    async fn open_tab(&self, url: &str) -> Result<()> {
        openTab(url).await.map_err(host_error)
    }

    async fn open_new_tab_page(&self) -> Result<()> {
        openNewTabPage().await.map_err(host_error)
    }

    async fn close_tabs(&self, ids: &[i32]) -> Result<()> {
        let ids: js_sys::Array = ids.iter().map(|&id| JsValue::from(id)).collect();
        closeTabs(ids).await.map_err(host_error)
    }
}
