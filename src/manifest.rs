use regex::Regex;
use std::sync::LazyLock;

use crate::model::{EditableDocument, Workload};

const DOCUMENT_EXTENSION: &str = ".yaml";

static REPLICAS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"replicas:\s*(\d+)").expect("replicas pattern is valid"));

pub fn render_workload_manifest(workload: &Workload) -> String {
    [
        "apiVersion: v1".to_string(),
        "kind: Pod".to_string(),
        "metadata:".to_string(),
        format!("  name: {}", workload.name),
        "  namespace: default".to_string(),
        "spec:".to_string(),
        "  containers:".to_string(),
        format!("  - name: {}", workload.name),
        format!("    image: {}", workload.image),
        "    resources:".to_string(),
        "      limits:".to_string(),
        "        memory: \"128Mi\"".to_string(),
        "        cpu: \"500m\"".to_string(),
        format!("  replicas: {}", workload.replicas),
        "status:".to_string(),
        format!("  phase: {}", workload.status),
    ]
    .join("\n")
}

pub fn editable_document(workload: &Workload) -> EditableDocument {
    EditableDocument {
        target_id: workload.id.clone(),
        display_name: format!("{}{DOCUMENT_EXTENSION}", workload.name),
        content: render_workload_manifest(workload),
    }
}

/// First line carrying `replicas: <int>`. Lines whose digits overflow are
/// skipped like any other malformed line.
pub fn parse_replicas(content: &str) -> Option<i32> {
    content.lines().find_map(|line| {
        REPLICAS_LINE
            .captures(line)
            .and_then(|captures| captures.get(1))
            .and_then(|digits| digits.as_str().parse::<i32>().ok())
    })
}

pub fn document_stem(display_name: &str) -> &str {
    display_name
        .strip_suffix(DOCUMENT_EXTENSION)
        .unwrap_or(display_name)
}
