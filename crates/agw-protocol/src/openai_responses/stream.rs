use serde::{Deserialize, Serialize};

use super::response::Response;
use super::types::{OutputContent, OutputItem};

/// The `response.*` event family. Events the gateway neither emits nor
/// consumes are tolerated at the parse layer by being skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseStreamEvent {
    #[serde(rename = "response.created")]
    Created {
        response: Response,
        sequence_number: i64,
    },
    #[serde(rename = "response.in_progress")]
    InProgress {
        response: Response,
        sequence_number: i64,
    },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        output_index: i64,
        item: OutputItem,
        sequence_number: i64,
    },
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        item_id: String,
        output_index: i64,
        content_index: i64,
        part: OutputContent,
        sequence_number: i64,
    },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        item_id: String,
        output_index: i64,
        content_index: i64,
        delta: String,
        sequence_number: i64,
    },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        item_id: String,
        output_index: i64,
        content_index: i64,
        text: String,
        sequence_number: i64,
    },
    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        item_id: String,
        output_index: i64,
        content_index: i64,
        part: OutputContent,
        sequence_number: i64,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        item_id: String,
        output_index: i64,
        delta: String,
        sequence_number: i64,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        item_id: String,
        output_index: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        arguments: String,
        sequence_number: i64,
    },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        output_index: i64,
        item: OutputItem,
        sequence_number: i64,
    },
    #[serde(rename = "response.completed")]
    Completed {
        response: Response,
        sequence_number: i64,
    },
    #[serde(rename = "response.incomplete")]
    Incomplete {
        response: Response,
        sequence_number: i64,
    },
    #[serde(rename = "response.failed")]
    Failed {
        response: Response,
        sequence_number: i64,
    },
}

impl ResponseStreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponseStreamEvent::Completed { .. }
                | ResponseStreamEvent::Incomplete { .. }
                | ResponseStreamEvent::Failed { .. }
        )
    }
}
