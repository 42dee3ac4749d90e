//! Command implementations.
//!
//! Every command prints a JSON document on stdout; logs go to stderr.

use crate::config::CliConfig;
use crate::error::CliError;
use nodeloom_ai::HttpModelBackend;
use nodeloom_core::{FolderId, NodeId, Result, WorkflowId};
use nodeloom_workflow::{Editor, HttpWorkflowStore, LoadReport, WorkflowStore};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::{info, warn};

fn print(value: &impl Serialize) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value).map_err(CliError::from)?;
    println!("{rendered}");
    Ok(())
}

fn workflow_store(config: &CliConfig) -> Result<Arc<HttpWorkflowStore>, CliError> {
    let store = HttpWorkflowStore::new(&config.store).map_err(CliError::from)?;
    Ok(Arc::new(store))
}

async fn open_editor(
    config: &CliConfig,
    workflow_id: &WorkflowId,
) -> Result<(Editor, LoadReport), CliError> {
    let backend = HttpModelBackend::new(&config.model).map_err(CliError::from)?;
    let mut editor = Editor::new(
        Arc::new(backend),
        workflow_store(config)?,
        config.editor.clone(),
    );
    let report = editor.open(workflow_id).await.map_err(CliError::from)?;
    for dropped in &report.dropped_edges {
        warn!(edge_id = %dropped.edge_id, reason = %dropped.reason, "edge dropped on load");
    }
    Ok((editor, report))
}

fn report_json(report: &LoadReport) -> JsonValue {
    let dropped: Vec<JsonValue> = report
        .dropped_edges
        .iter()
        .map(|d| json!({"edgeId": d.edge_id, "reason": d.reason.to_string()}))
        .collect();
    json!({"droppedEdges": dropped})
}

pub async fn create(
    config: &CliConfig,
    name: &str,
    folder_id: Option<&FolderId>,
) -> Result<(), CliError> {
    let store = workflow_store(config)?;
    let document = store
        .create_workflow(name, folder_id)
        .await
        .map_err(CliError::from)?;
    info!(workflow_id = %document.id, "created workflow");
    print(&document)
}

pub async fn show(config: &CliConfig, workflow_id: &WorkflowId) -> Result<(), CliError> {
    let (editor, report) = open_editor(config, workflow_id).await?;
    let metadata = editor.metadata();
    let nodes: Vec<JsonValue> = editor
        .nodes()
        .iter()
        .map(|node| {
            json!({
                "id": node.id,
                "type": node.kind().as_str(),
                "label": node.data.label(),
                "position": node.position,
            })
        })
        .collect();
    let edges: Vec<JsonValue> = editor
        .edges()
        .iter()
        .map(|edge| {
            json!({
                "id": edge.id,
                "source": edge.source,
                "target": edge.target,
                "targetHandle": edge.target_handle,
            })
        })
        .collect();

    print(&json!({
        "id": metadata.id,
        "name": metadata.name,
        "folderId": metadata.folder_id,
        "updatedAt": metadata.updated_at,
        "nodes": nodes,
        "edges": edges,
        "load": report_json(&report),
    }))
}

pub async fn resolve(
    config: &CliConfig,
    workflow_id: &WorkflowId,
    node_id: &NodeId,
) -> Result<(), CliError> {
    let (editor, _) = open_editor(config, workflow_id).await?;
    let inputs = editor.resolve_inputs(node_id).map_err(CliError::from)?;
    let images: Vec<&str> = inputs.images.iter().map(|i| i.file_name.as_str()).collect();
    print(&json!({
        "nodeId": node_id,
        "systemPrompt": inputs.system_prompt,
        "userMessage": inputs.user_message,
        "images": images,
    }))
}

pub async fn run(
    config: &CliConfig,
    workflow_id: &WorkflowId,
    node_ids: &[NodeId],
    save: bool,
) -> Result<(), CliError> {
    let (mut editor, _) = open_editor(config, workflow_id).await?;
    for node_id in node_ids {
        editor.run_node(node_id).map_err(CliError::from)?;
    }
    editor.wait_idle().await;

    let outputs: Vec<JsonValue> = node_ids
        .iter()
        .filter_map(|id| editor.node(id))
        .filter_map(|node| {
            let data = node.model_data()?;
            Some(json!({"nodeId": node.id, "output": data.output, "error": data.error}))
        })
        .collect();

    let saved = if save && editor.is_dirty() {
        Some(editor.save().await.map_err(CliError::from)?)
    } else {
        None
    };

    print(&json!({
        "tasks": editor.tasks(),
        "outputs": outputs,
        "saved": saved,
    }))
}

pub async fn delete(config: &CliConfig, workflow_id: &WorkflowId) -> Result<(), CliError> {
    let store = workflow_store(config)?;
    store
        .delete_workflow(workflow_id)
        .await
        .map_err(CliError::from)?;
    info!(workflow_id = %workflow_id, "deleted workflow");
    print(&json!({"deleted": workflow_id}))
}
