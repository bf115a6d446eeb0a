/// Extension message protocol
///
/// Requests arrive as JSON objects with a `type` discriminant, e.g.
/// `{ "type": "createSubTag", "parentPath": "Work", "subTagName": "Email" }`,
/// and are answered with `{ "ok": true, ... }` or `{ "ok": false, "error": "..." }`.
use crate::error::{Result, TagError};
use crate::host::{TabHost, TabScope};
use crate::operations::TagManager;
use crate::rules::RuleTable;
use crate::storage::KeyValueStore;
use crate::tab_data::SavedItem;
use crate::tag_ref::TagRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The parts of a tab the classifier looks at
#[derive(Debug, Clone, Deserialize)]
pub struct TabQuery {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl TabQuery {
    fn to_item(&self) -> SavedItem {
        SavedItem {
            url: self.url.clone(),
            title: self.title.clone(),
            fav_icon_url: String::new(),
            saved_at: Utc::now(),
            classified_as: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    GetTags,
    GetTagsFlat,
    GetTagData {
        tag: TagRef,
    },
    SaveAndClose {
        tag: String,
        #[serde(default)]
        scope: TabScope,
        #[serde(default)]
        use_classification: bool,
    },
    DeleteItem {
        tag: TagRef,
        index: usize,
    },
    DeleteItemById {
        url: String,
        saved_at: DateTime<Utc>,
    },
    DeleteTag {
        tag: TagRef,
    },
    RestoreItem {
        item: SavedItem,
    },
    RestoreAll {
        tag: TagRef,
    },
    GetTagSettings {
        tag: TagRef,
    },
    SetTagSettings {
        tag: TagRef,
        settings: Value,
    },
    GetGlobalSettings,
    SetGlobalSettings {
        settings: Value,
    },
    ClassifyTab {
        tab: TabQuery,
    },
    GetSuggestedTag {
        tab: TabQuery,
    },
    GetClassificationRules,
    SetClassificationRules {
        rules: RuleTable,
    },
    AddCustomRule {
        tag_name: String,
        #[serde(default)]
        url_patterns: Vec<String>,
        #[serde(default)]
        title_keywords: Vec<String>,
    },
    RemoveRule {
        tag_name: String,
    },
    DescribeRule {
        tag_name: String,
    },
    ResetClassificationRules,
    CreateTag {
        tag_name: String,
    },
    CreateSubTag {
        parent_path: String,
        sub_tag_name: String,
    },
    MoveTag {
        from_path: String,
        #[serde(default)]
        to_parent_path: Option<String>,
    },
    ToggleTagCollapse {
        tag_path: String,
    },
    SyncTagConditions {
        tag: TagRef,
    },
}

fn body<T: Serialize>(field: &'static str, value: T) -> Result<Value> {
    let value = serde_json::to_value(value).map_err(|source| TagError::Serialize { key: field, source })?;
    Ok(json!({ field: value }))
}

/// Run one request and return the response fields (without `ok`)
pub async fn dispatch<S, H>(manager: &TagManager<S>, host: &H, request: Request) -> Result<Value>
where
    S: KeyValueStore,
    H: TabHost + ?Sized,
{
    match request {
        Request::GetTags => body("tags", manager.get_tags().await?),
        Request::GetTagsFlat => body("tags", manager.get_flat_tags().await?),
        Request::GetTagData { tag } => body("items", manager.get_tag_data(tag.path()).await?),
        Request::SaveAndClose {
            tag,
            scope,
            use_classification,
        } => {
            let outcome = manager.save_and_close(host, &tag, scope, use_classification).await?;
            body("saved", outcome.saved)
        }
        Request::DeleteItem { tag, index } => {
            manager.delete_item(tag.path(), index).await?;
            Ok(json!({}))
        }
        Request::DeleteItemById { url, saved_at } => {
            body("deleted", manager.delete_item_by_id(&url, &saved_at).await?)
        }
        Request::DeleteTag { tag } => {
            manager.delete_tag(tag.path()).await?;
            Ok(json!({}))
        }
        Request::RestoreItem { item } => {
            manager.restore_item(host, &item).await?;
            Ok(json!({}))
        }
        Request::RestoreAll { tag } => body("restored", manager.restore_all(host, tag.path()).await?),
        Request::GetTagSettings { tag } => body("settings", manager.get_tag_settings(tag.path()).await?),
        Request::SetTagSettings { tag, settings } => {
            body("settings", manager.set_tag_settings(tag.path(), settings).await?)
        }
        Request::GetGlobalSettings => body("settings", manager.get_global_settings().await?),
        Request::SetGlobalSettings { settings } => {
            body("settings", manager.set_global_settings(settings).await?)
        }
        Request::ClassifyTab { tab } => body("matches", manager.classify(&tab.to_item()).await?),
        Request::GetSuggestedTag { tab } => {
            body("suggestedTag", manager.suggest_tag(&tab.to_item()).await?)
        }
        Request::GetClassificationRules => body("rules", manager.get_classification_rules().await?),
        Request::SetClassificationRules { rules } => {
            manager.set_classification_rules(rules).await?;
            Ok(json!({}))
        }
        Request::AddCustomRule {
            tag_name,
            url_patterns,
            title_keywords,
        } => body(
            "rules",
            manager
                .add_custom_rule(&tag_name, &url_patterns, &title_keywords)
                .await?,
        ),
        Request::RemoveRule { tag_name } => body("rules", manager.remove_rule(&tag_name).await?),
        Request::DescribeRule { tag_name } => {
            body("description", manager.describe_rule(&tag_name).await?)
        }
        Request::ResetClassificationRules => body("rules", manager.reset_classification_rules().await?),
        Request::CreateTag { tag_name } => body("newTagPath", manager.create_tag(&tag_name).await?),
        Request::CreateSubTag {
            parent_path,
            sub_tag_name,
        } => body(
            "newTagPath",
            manager.create_sub_tag(&parent_path, &sub_tag_name).await?,
        ),
        Request::MoveTag {
            from_path,
            to_parent_path,
        } => body(
            "newPath",
            manager.move_tag(&from_path, to_parent_path.as_deref()).await?,
        ),
        Request::ToggleTagCollapse { tag_path } => {
            body("collapsed", manager.toggle_collapse(&tag_path).await?)
        }
        Request::SyncTagConditions { tag } => body("imported", manager.sync_tag_conditions(tag.path()).await?),
    }
}

fn failure(error: impl std::fmt::Display) -> Value {
    json!({ "ok": false, "error": error.to_string() })
}

/// Decode, dispatch and wrap a raw JSON request; never fails
pub async fn handle<S, H>(manager: &TagManager<S>, host: &H, message: Value) -> Value
where
    S: KeyValueStore,
    H: TabHost + ?Sized,
{
    let request: Request = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(e) => {
            log::warn!("Rejected message: {}", e);
            return failure(format!("Unknown or malformed message: {}", e));
        }
    };
    log::debug!("Handling {:?}", request);

    match dispatch(manager, host, request).await {
        Ok(Value::Object(mut fields)) => {
            fields.insert("ok".to_string(), Value::Bool(true));
            Value::Object(fields)
        }
        Ok(_) => json!({ "ok": true }),
        Err(e) => {
            log::error!("Request failed: {}", e);
            failure(e)
        }
    }
}
