use std::path::Path;

use anyhow::{Context, Result};
use overseer_state::{
    build_state_items, infer_actions, CancelToken, ComposedItem, Item, LeafItem, Plan, Scalar,
    Step,
};
use serde_json::Value;

/// Read a JSON state snapshot.
pub fn read_snapshot(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse JSON in snapshot {}", path.display()))
}

/// The plan that takes `prev` to `next`.
pub fn plan_documents(prev: &Value, next: &Value) -> Result<Plan> {
    let prev_items = build_state_items(prev).context("while building the previous state")?;
    let next_items = build_state_items(next).context("while building the next state")?;
    Ok(infer_actions(&prev_items, &next_items))
}

/// The plan between two snapshot files. Without `prev`, the previous state is
/// empty.
pub fn plan_files(prev: Option<&Path>, next: &Path) -> Result<Plan> {
    let prev = match prev {
        Some(path) => read_snapshot(path)?,
        None => Value::Object(Default::default()),
    };
    let next = read_snapshot(next)?;
    plan_documents(&prev, &next)
}

/// One line per step. Updates of composed items are followed by the steps
/// they consist of, indented.
pub fn render_plan(plan: &Plan, token: &CancelToken) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    render_steps(plan, 0, token, &mut lines)?;
    Ok(lines)
}

fn render_steps(
    plan: &Plan,
    depth: usize,
    token: &CancelToken,
    lines: &mut Vec<String>,
) -> Result<()> {
    let indent = "  ".repeat(depth);
    for step in plan.steps() {
        token.check()?;
        match step {
            Step::Update { next, prev } => {
                if let (Some(next), Some(prev)) = (as_composed(next), as_composed(prev)) {
                    lines.push(format!("{}{}", indent, step));
                    let inner = infer_actions(prev.parts(), next.parts());
                    render_steps(&inner, depth + 1, token, lines)?;
                } else if let (Some(next), Some(prev)) = (as_leaf(next), as_leaf(prev)) {
                    lines.push(format!(
                        "{}{}: {} -> {}",
                        indent,
                        step,
                        show(prev.value()),
                        show(next.value())
                    ));
                } else {
                    lines.push(format!("{}{} (replace)", indent, step));
                }
            }
            Step::Remove(item) | Step::Create(item) => match as_leaf(item) {
                Some(leaf) => lines.push(format!("{}{} = {}", indent, step, show(leaf.value()))),
                None => lines.push(format!("{}{}", indent, step)),
            },
        }
    }
    Ok(())
}

fn as_composed(item: &std::sync::Arc<dyn Item>) -> Option<&ComposedItem> {
    item.as_any().downcast_ref::<ComposedItem>()
}

fn as_leaf(item: &std::sync::Arc<dyn Item>) -> Option<&LeafItem> {
    item.as_any().downcast_ref::<LeafItem>()
}

fn show(value: &dyn Scalar) -> String {
    match value.as_any().downcast_ref::<Value>() {
        Some(json) => json.to_string(),
        None => format!("{:?}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_updates_are_expanded() {
        let prev = json!({"a": 1, "b": {"c": true, "e": "x"}});
        let next = json!({"b": {"c": false, "e": "x"}, "d": [1]});
        let plan = plan_documents(&prev, &next).unwrap();
        let lines = render_plan(&plan, &CancelToken::new()).unwrap();
        assert_eq!(
            lines,
            vec![
                "remove /a = 1",
                "update /b",
                "  update /b/c: true -> false",
                "create /d",
            ]
        );
    }

    #[test]
    fn kind_change_is_a_replacement() {
        let prev = json!({"a": 1});
        let next = json!({"a": {"b": 2}});
        let plan = plan_documents(&prev, &next).unwrap();
        let lines = render_plan(&plan, &CancelToken::new()).unwrap();
        assert_eq!(lines, vec!["update /a (replace)"]);
    }

    #[test]
    fn files_without_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let next = dir.path().join("next.json");
        std::fs::write(&next, r#"[{"name": "web"}, "db"]"#).unwrap();
        let plan = plan_files(None, &next).unwrap();
        let lines = render_plan(&plan, &CancelToken::new()).unwrap();
        assert_eq!(lines, vec!["create /0", "create /1 = \"db\""]);
    }

    #[test]
    fn same_file_twice_is_no_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"servers": {"web": {"port": 80}}}"#).unwrap();
        assert!(plan_files(Some(path.as_path()), &path).unwrap().is_empty());
    }

    #[test]
    fn unreadable_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = plan_files(None, &missing).unwrap_err();
        assert!(err.to_string().contains("failed to read snapshot"));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{").unwrap();
        let err = plan_files(None, &broken).unwrap_err();
        assert!(err.to_string().contains("failed to parse JSON"));

        let scalar = dir.path().join("scalar.json");
        std::fs::write(&scalar, "42").unwrap();
        let err = plan_files(None, &scalar).unwrap_err();
        assert_eq!(err.to_string(), "while building the next state");
    }

    #[test]
    fn rendering_stops_when_cancelled() {
        let plan = plan_documents(&json!({}), &json!({"a": 1})).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let err = render_plan(&plan, &token).unwrap_err();
        assert_eq!(err.to_string(), "cancelled");
    }
}
