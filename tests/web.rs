//! Browser-side tests, run with `wasm-pack test --headless --chrome`
#![cfg(target_arch = "wasm32")]

use serde_json::json;
use tag_tab::{MemoryStore, TagManager, handle};
use tag_tab::host::{TabHost, TabScope};
use tag_tab::tab_data::TabInfo;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

struct NoTabs;

#[async_trait::async_trait(?Send)]
impl TabHost for NoTabs {
    async fn query_tabs(&self, _scope: TabScope) -> tag_tab::Result<Vec<TabInfo>> {
        Ok(Vec::new())
    }

    async fn open_tab(&self, _url: &str) -> tag_tab::Result<()> {
        Ok(())
    }

    async fn open_new_tab_page(&self) -> tag_tab::Result<()> {
        Ok(())
    }

    async fn close_tabs(&self, _ids: &[i32]) -> tag_tab::Result<()> {
        Ok(())
    }
}

#[wasm_bindgen_test]
fn test_extract_hostname_export() {
    assert_eq!(tag_tab::extract_hostname("https://www.example.com/a?b=c"), "www.example.com");
    assert_eq!(tag_tab::extract_hostname("not a url"), "");
}

#[wasm_bindgen_test]
async fn test_tag_lifecycle_through_messages() {
    let manager = TagManager::new(MemoryStore::new());

    let created = handle(&manager, &NoTabs, json!({ "type": "createTag", "tagName": "Work" })).await;
    let sub = handle(
        &manager,
        &NoTabs,
        json!({ "type": "createSubTag", "parentPath": "Work", "subTagName": "Email" }),
    )
    .await;
    let deleted = handle(&manager, &NoTabs, json!({ "type": "deleteTag", "tag": "Work" })).await;
    let flat = handle(&manager, &NoTabs, json!({ "type": "getTagsFlat" })).await;

    assert_eq!(created["ok"], true);
    assert_eq!(sub["newTagPath"], "Work/Email");
    assert_eq!(deleted["ok"], true);
    assert_eq!(flat["tags"], json!(["Work/Email"]));
}

#[wasm_bindgen_test]
async fn test_save_with_no_tabs() {
    let manager = TagManager::new(MemoryStore::new());

    let response = handle(
        &manager,
        &NoTabs,
        json!({ "type": "saveAndClose", "tag": "Reading", "scope": "allWindows" }),
    )
    .await;

    assert_eq!(response, json!({ "ok": true, "saved": 0 }));
}
