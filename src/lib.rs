/// Tag Tab - hierarchical tab tagging for Chrome
/// Built with Rust + WASM

mod bridge;
pub mod classifier;
pub mod domain;
pub mod error;
pub mod hierarchy;
pub mod host;
pub mod messages;
pub mod operations;
pub mod pattern;
pub mod rules;
pub mod settings;
pub mod storage;
pub mod tab_data;
pub mod tag_ref;

pub use bridge::{ChromeStorage, ChromeTabs};
pub use error::{Result, StoreError, TagError};
pub use messages::{Request, dispatch, handle};
pub use operations::TagManager;
pub use storage::{KeyValueStore, MemoryStore, StorageData};

use serde::Serialize;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

thread_local! {
    // One manager per worker so every message goes through the same writer lock
    static MANAGER: Rc<TagManager<ChromeStorage>> = Rc::new(TagManager::new(ChromeStorage));
}

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

/// Entry point for the service worker's `chrome.runtime.onMessage` listener.
///
/// Always resolves; failures come back as `{ ok: false, error }`.
#[wasm_bindgen]
pub async fn handle_message(message: JsValue) -> std::result::Result<JsValue, JsValue> {
    let message: serde_json::Value = serde_wasm_bindgen::from_value(message)?;
    let manager = MANAGER.with(Rc::clone);

    let response = handle(&manager, &ChromeTabs, message).await;
    response
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

#[wasm_bindgen]
pub fn extract_hostname(url: &str) -> String {
    domain::extract_hostname(url).unwrap_or_default()
}
