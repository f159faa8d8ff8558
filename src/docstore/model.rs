use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Deserialize, Debug)]
pub struct SaveDocumentResp {
    pub id: String,
}

#[derive(Deserialize, Debug)]
pub struct QueryDocumentsResp {
    #[serde(default)]
    pub documents: Vec<Map<String, Value>>,
}
