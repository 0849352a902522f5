//! StageForm port - stage ごとのフォーム能力
//!
//! 文字列規約による動的モジュール読み込みの代わりに、
//! `form_module → StageFormFactory` のテーブルを起動時に解決する。
//!
//! # 二層構造
//! - **StageFormFactory**: form_module ごとに 1 つ登録される
//! - **StageForm**: stage 定義ごとに factory が作る（object-safe）

use std::sync::Arc;

use serde_json::{Value, json};

use crate::domain::StageDefinition;
use crate::domain::content::carries_user_content;

pub trait StageForm: Send + Sync {
    fn stage_id(&self) -> &str;

    /// Payload a brand-new stage starts with.
    fn initial_payload(&self) -> Value {
        json!({})
    }

    /// Does this payload hold real user data (input text, an upload, results)?
    fn has_user_content(&self, payload: &Value) -> bool {
        carries_user_content(payload)
    }
}

pub trait StageFormFactory: Send + Sync {
    /// The `formModule` reference this factory serves.
    fn form_module(&self) -> &str;

    fn create(&self, stage: &StageDefinition) -> Arc<dyn StageForm>;
}
