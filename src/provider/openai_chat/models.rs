use crate::types::ModelInfo;

use super::types::OpenAiModelList;

/// OpenAI publishes no display names, so the id doubles as the name.
pub(crate) fn map_models(list: OpenAiModelList) -> Vec<ModelInfo> {
    list.data
        .into_iter()
        .map(|model| ModelInfo {
            name: Some(model.id.clone()),
            id: model.id,
            description: None,
            created: model.created,
        })
        .collect()
}
