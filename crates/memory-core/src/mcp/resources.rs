// src/mcp/resources.rs
// MCP resource handlers (§6): read-only `memory://...` URIs, separate from
// the tool surface in `mod.rs`. Static resource/template lists plus a
// `uri.as_str()` match dispatching into per-resource readers.

use rmcp::model::{
    AnnotateAble, Annotated, ListResourceTemplatesResult, ListResourcesResult,
    PaginatedRequestParam, RawResource, RawResourceTemplate, ReadResourceRequestParam,
    ReadResourceResult, ResourceContents,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::ErrorData;

use crate::analytics::AnalyticsEngine;
use memory_types::{RecordType, GLOBAL_REPOSITORY};

use super::MemoryServer;

fn no_ann<T: AnnotateAble>(raw: T) -> Annotated<T> {
    Annotated::new(raw, None)
}

fn text_result(uri: &str, json: serde_json::Value) -> ReadResourceResult {
    let text = serde_json::to_string_pretty(&json).unwrap_or_else(|_| "null".to_string());
    ReadResourceResult {
        contents: vec![ResourceContents::TextResourceContents {
            uri: uri.to_string(),
            mime_type: Some("application/json".to_string()),
            text,
            meta: None,
        }],
    }
}

impl MemoryServer {
    fn resource_list() -> Vec<Annotated<RawResource>> {
        vec![no_ann(RawResource {
            uri: "memory://global/insights".into(),
            name: "global-insights".into(),
            title: Some("Cross-repository insights".into()),
            description: Some("Health and pattern summary across the global repository".into()),
            mime_type: Some("application/json".into()),
            size: None,
            icons: None,
            meta: None,
        })]
    }

    fn resource_template_list() -> Vec<Annotated<RawResourceTemplate>> {
        vec![
            no_ann(RawResourceTemplate {
                uri_template: "memory://recent/{repo}".into(),
                name: "recent-by-repo".into(),
                title: Some("Recent records".into()),
                description: Some("Records from the last 7 days for a repository".into()),
                mime_type: Some("application/json".into()),
                icons: None,
            }),
            no_ann(RawResourceTemplate {
                uri_template: "memory://patterns/{repo}".into(),
                name: "patterns-by-repo".into(),
                title: Some("Tag patterns".into()),
                description: Some("Most common tags for a repository".into()),
                mime_type: Some("application/json".into()),
                icons: None,
            }),
            no_ann(RawResourceTemplate {
                uri_template: "memory://decisions/{repo}".into(),
                name: "decisions-by-repo".into(),
                title: Some("Architecture decisions".into()),
                description: Some("Stored architecture_decision records for a repository".into()),
                mime_type: Some("application/json".into()),
                icons: None,
            }),
        ]
    }

    pub(super) async fn handle_list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult {
            resources: Self::resource_list(),
            next_cursor: None,
            meta: None,
        })
    }

    pub(super) async fn handle_list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, ErrorData> {
        Ok(ListResourceTemplatesResult {
            resource_templates: Self::resource_template_list(),
            next_cursor: None,
            meta: None,
        })
    }

    pub(super) async fn handle_read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let uri = request.uri.as_str();
        if uri == "memory://global/insights" {
            return self.read_global_insights().await;
        }
        if let Some(repo) = uri.strip_prefix("memory://recent/") {
            return self.read_recent(repo, uri).await;
        }
        if let Some(repo) = uri.strip_prefix("memory://patterns/") {
            return self.read_patterns(repo, uri).await;
        }
        if let Some(repo) = uri.strip_prefix("memory://decisions/") {
            return self.read_decisions(repo, uri).await;
        }
        Err(ErrorData::invalid_params(
            format!("unknown resource URI: {uri}"),
            None,
        ))
    }

    async fn read_recent(&self, repo: &str, uri: &str) -> Result<ReadResourceResult, ErrorData> {
        let all = self
            .ctx
            .store
            .get_all_chunks(Some(repo))
            .await
            .map_err(|e| ErrorData::internal_error(e.to_user_string(), None))?;
        let since = chrono::Utc::now() - chrono::Duration::days(7);
        let recent: Vec<_> = all
            .iter()
            .filter(|r| r.timestamp >= since)
            .map(|r| serde_json::to_value(r).unwrap_or(serde_json::Value::Null))
            .collect();
        Ok(text_result(uri, serde_json::json!({ "repository": repo, "records": recent })))
    }

    async fn read_patterns(&self, repo: &str, uri: &str) -> Result<ReadResourceResult, ErrorData> {
        let all = self
            .ctx
            .store
            .get_all_chunks(Some(repo))
            .await
            .map_err(|e| ErrorData::internal_error(e.to_user_string(), None))?;
        let patterns = AnalyticsEngine::patterns(&all);
        let patterns_json: Vec<_> = patterns
            .iter()
            .map(|p| serde_json::json!({ "tag": p.tag, "count": p.count }))
            .collect();
        Ok(text_result(uri, serde_json::json!({ "repository": repo, "patterns": patterns_json })))
    }

    async fn read_decisions(&self, repo: &str, uri: &str) -> Result<ReadResourceResult, ErrorData> {
        let all = self
            .ctx
            .store
            .get_all_chunks(Some(repo))
            .await
            .map_err(|e| ErrorData::internal_error(e.to_user_string(), None))?;
        let decisions: Vec<_> = all
            .iter()
            .filter(|r| r.record_type == RecordType::ArchitectureDecision)
            .map(|r| serde_json::to_value(r).unwrap_or(serde_json::Value::Null))
            .collect();
        Ok(text_result(uri, serde_json::json!({ "repository": repo, "decisions": decisions })))
    }

    async fn read_global_insights(&self) -> Result<ReadResourceResult, ErrorData> {
        let all = self
            .ctx
            .store
            .get_all_chunks(Some(GLOBAL_REPOSITORY))
            .await
            .map_err(|e| ErrorData::internal_error(e.to_user_string(), None))?;
        let health = AnalyticsEngine::health(&all);
        let patterns = AnalyticsEngine::patterns(&all);
        let patterns_json: Vec<_> = patterns
            .iter()
            .map(|p| serde_json::json!({ "tag": p.tag, "count": p.count }))
            .collect();
        Ok(text_result(
            "memory://global/insights",
            serde_json::json!({
                "health_score": health.score,
                "band": format!("{:?}", health.band),
                "patterns": patterns_json,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_list_has_global_insights() {
        let resources = MemoryServer::resource_list();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].raw.uri, "memory://global/insights");
    }

    #[test]
    fn resource_template_list_covers_all_three_templates() {
        let templates = MemoryServer::resource_template_list();
        assert_eq!(templates.len(), 3);
        assert!(templates.iter().any(|t| t.raw.uri_template == "memory://recent/{repo}"));
        assert!(templates.iter().any(|t| t.raw.uri_template == "memory://patterns/{repo}"));
        assert!(templates.iter().any(|t| t.raw.uri_template == "memory://decisions/{repo}"));
    }
}
