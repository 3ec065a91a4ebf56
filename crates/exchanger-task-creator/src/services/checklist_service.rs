//! Checklist tree parsing and checklist-add calls (spec §4.2.4, §4.2 step 7c).

use std::collections::HashMap;

use exchanger_downstream_client::DownstreamClient;
use exchanger_shared::ChecklistNode;

/// Creates one checklist group per `level = 0` node, then one item per
/// `level > 0` node whose parent is a known group. Deeper nesting
/// (children of items) has no known group parent and is silently
/// dropped, matching spec §4.2.4. Best-effort: failures are logged and
/// do not abort the already-created task.
pub async fn create_checklist(client: &DownstreamClient, task_id: &str, nodes: &[ChecklistNode]) {
    let mut groups: HashMap<&str, String> = HashMap::new();

    for node in nodes.iter().filter(|n| n.level == 0) {
        match client.add_checklist_group(task_id, &node.title).await {
            Ok(group_id) => {
                groups.insert(node.id.as_str(), group_id);
            }
            Err(err) => tracing::warn!(task_id, node_id = %node.id, %err, "failed to create checklist group"),
        }
    }

    for node in nodes.iter().filter(|n| n.level > 0) {
        let Some(parent_id) = node.parent_id.as_deref() else { continue };
        let Some(group_id) = groups.get(parent_id) else { continue };
        if let Err(err) = client.add_checklist_item(task_id, group_id, &node.title).await {
            tracing::warn!(task_id, node_id = %node.id, %err, "failed to create checklist item");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_zero_nodes_are_the_only_groups() {
        let nodes = vec![
            ChecklistNode { id: "1".into(), title: "Group".into(), level: 0, parent_id: None },
            ChecklistNode { id: "2".into(), title: "Item".into(), level: 1, parent_id: Some("1".into()) },
            ChecklistNode { id: "3".into(), title: "Grandchild".into(), level: 2, parent_id: Some("2".into()) },
        ];
        let groups: Vec<_> = nodes.iter().filter(|n| n.level == 0).collect();
        assert_eq!(groups.len(), 1);
        let items: Vec<_> = nodes.iter().filter(|n| n.level > 0).collect();
        assert_eq!(items.len(), 2);
    }
}
