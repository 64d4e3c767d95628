//! Lowers a free-form JSON rule document into a normalized, linear `steps[]`
//! (§4.1). Several authoring dialects are accepted; all converge on the same
//! [`wf_schemas::step::Step`] shape so the orchestrator never has to know
//! which dialect produced a given workflow.

mod delay_table;

use serde_json::{json, Value};
use wf_schemas::step::{Step, StepKind};

pub use delay_table::delay_ms_for_key;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("rule must be a JSON object")]
    NotAnObject,
    #[error("clause must be a JSON object: {0}")]
    InvalidClause(Value),
    #[error("parallel rule is missing `branches`")]
    MissingBranches,
    #[error("`==` condition must be `[{{var}}, value]`")]
    InvalidEquality,
    #[error("unknown step type in passthrough `steps[]`: {0}")]
    UnknownStepType(String),
}

struct RawStep {
    kind: StepKind,
    data: Value,
    rule: Value,
    next: Option<Vec<String>>,
}

impl RawStep {
    fn new(kind: StepKind, data: Value, rule: Value) -> Self {
        Self {
            kind,
            data,
            rule,
            next: None,
        }
    }
}

/// Compile a rule document into its normalized step list. Compiling the same
/// rule twice, or compiling the `{"steps": [...]}` re-serialization of a
/// prior compile, yields a structurally identical result (§8 invariant).
pub fn compile(rule: &Value) -> Result<Vec<Step>, CompileError> {
    let raw = lower_root(rule)?;
    Ok(assign_ids(raw))
}

/// Re-serialize a compiled step list as a `{"steps": [...]}` rule document,
/// i.e. the passthrough dialect's input shape.
pub fn rule_for_steps(steps: &[Step]) -> Value {
    json!({ "steps": steps })
}

/// Compile the raw `thenActions` a matched condition step extracted (§4.3) into
/// freshly-ided steps, so the orchestrator can splice them after the condition
/// without colliding with the statically compiled `step_<n>` ids. Ids take the
/// form `<id_prefix>_dyn_<i>`, which is how resume-time step lookup recognizes
/// a step that was never in the original compiled definition and needs
/// reconstructing rather than looking up directly.
pub fn compile_fragment(clauses: &[Value], id_prefix: &str) -> Result<Vec<Step>, CompileError> {
    let raw = lower_clause_list(clauses)?;
    let len = raw.len();
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let id = format!("{id_prefix}_dyn_{i}");
            let next = r.next.unwrap_or_else(|| {
                if i + 1 < len {
                    vec![format!("{id_prefix}_dyn_{}", i + 1)]
                } else {
                    vec![]
                }
            });
            Step {
                id,
                kind: r.kind,
                data: r.data,
                rule: Some(r.rule),
                next,
            }
        })
        .collect())
}

fn assign_ids(raw: Vec<RawStep>) -> Vec<Step> {
    let len = raw.len();
    raw.into_iter()
        .enumerate()
        .map(|(i, r)| {
            let next = r.next.unwrap_or_else(|| {
                if i + 1 < len {
                    vec![format!("step_{}", i + 1)]
                } else {
                    vec![]
                }
            });
            Step {
                id: format!("step_{i}"),
                kind: r.kind,
                data: r.data,
                rule: Some(r.rule),
                next,
            }
        })
        .collect()
}

fn lower_root(rule: &Value) -> Result<Vec<RawStep>, CompileError> {
    let obj = rule.as_object().ok_or(CompileError::NotAnObject)?;

    if let Some(steps) = obj.get("steps").and_then(|v| v.as_array()) {
        return steps.iter().map(lower_existing_step).collect();
    }
    if let Some(and_list) = obj.get("and").and_then(|v| v.as_array()) {
        return lower_clause_list(and_list);
    }
    if let Some(parallel) = obj.get("parallel") {
        return lower_parallel(parallel);
    }
    // Bare single clause, e.g. `{"send_email": {...}}` with no wrapping `and`.
    lower_clause_list(std::slice::from_ref(rule))
}

fn lower_parallel(parallel: &Value) -> Result<Vec<RawStep>, CompileError> {
    let branches = parallel
        .get("branches")
        .and_then(|v| v.as_array())
        .ok_or(CompileError::MissingBranches)?;

    let mut out = Vec::new();
    for branch in branches {
        let clauses: Vec<Value> = if let Some(list) = branch.get("and").and_then(|v| v.as_array()) {
            list.clone()
        } else if let Some(list) = branch.get("or").and_then(|v| v.as_array()) {
            list.clone()
        } else {
            vec![branch.clone()]
        };
        out.extend(lower_clause_list(&clauses)?);
    }
    Ok(out)
}

fn lower_clause_list(items: &[Value]) -> Result<Vec<RawStep>, CompileError> {
    items.iter().map(lower_clause).collect()
}

const ACTION_KEYS: &[(&str, &str)] = &[
    ("send_email", "send_email"),
    ("send_sms", "send_sms"),
    ("send_mail", "send_email"),
    ("Send Mail", "send_email"),
];

const CONDITION_SHORTHAND_KEYS: &[&str] = &[
    "product_package",
    "user_segment",
    "subscription_status",
    "email_domain",
];

fn lower_clause(clause: &Value) -> Result<RawStep, CompileError> {
    let obj = clause
        .as_object()
        .ok_or_else(|| CompileError::InvalidClause(clause.clone()))?;

    if let Some(delay) = obj.get("delay") {
        let delay_type = delay
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("1_second")
            .to_string();
        let delay_ms = delay_ms_for_key(&delay_type);
        return Ok(RawStep::new(
            StepKind::Delay,
            json!({ "delayType": delay_type, "delayMs": delay_ms }),
            clause.clone(),
        ));
    }

    for (key, action_type) in ACTION_KEYS {
        if let Some(data) = obj.get(*key) {
            return Ok(RawStep::new(
                StepKind::Action,
                enrich_action_data(action_type, data),
                clause.clone(),
            ));
        }
    }

    if let Some(name) = obj.get("sharedFlow") {
        return Ok(RawStep::new(
            StepKind::SharedFlow,
            json!({ "name": name }),
            clause.clone(),
        ));
    }

    if obj.contains_key("end") {
        return Ok(RawStep::new(StepKind::End, json!({}), clause.clone()));
    }

    if let Some(cond) = obj.get("condition").or_else(|| obj.get("if")) {
        let mut data = normalize_condition(cond);
        if let Some(then) = obj.get("then").and_then(|v| v.as_array()) {
            data["thenActions"] = Value::Array(then.clone());
        }
        return Ok(RawStep::new(StepKind::Condition, data, clause.clone()));
    }

    if let Some(eq) = obj.get("==") {
        return Ok(RawStep::new(
            StepKind::Condition,
            normalize_equality(eq)?,
            clause.clone(),
        ));
    }

    if let Some((key, value)) = obj
        .iter()
        .find(|(k, _)| CONDITION_SHORTHAND_KEYS.contains(&k.as_str()))
    {
        let mut data = json!({ "conditionType": key, "conditionValue": value, "operator": "equals" });
        if let Some(then) = obj.get("then").and_then(|v| v.as_array()) {
            data["thenActions"] = Value::Array(then.clone());
        }
        return Ok(RawStep::new(StepKind::Condition, data, clause.clone()));
    }

    // Anything unrecognized falls back to a custom action, per §4.1.
    Ok(RawStep::new(
        StepKind::Action,
        json!({ "actionType": "custom", "data": clause }),
        clause.clone(),
    ))
}

fn enrich_action_data(action_type: &str, data: &Value) -> Value {
    json!({
        "actionType": action_type,
        "templateId": data.get("templateId"),
        "subject": data.get("subject"),
        "to": data.get("to"),
        "data": data,
    })
}

fn normalize_condition(cond: &Value) -> Value {
    let condition_type = cond
        .get("field")
        .or_else(|| cond.get("conditionType"))
        .cloned()
        .unwrap_or(Value::Null);
    let condition_value = cond
        .get("value")
        .or_else(|| cond.get("conditionValue"))
        .cloned()
        .unwrap_or(Value::Null);
    let operator = cond
        .get("operator")
        .and_then(|v| v.as_str())
        .unwrap_or("equals");
    json!({ "conditionType": condition_type, "conditionValue": condition_value, "operator": operator })
}

fn normalize_equality(eq: &Value) -> Result<Value, CompileError> {
    let arr = eq.as_array().ok_or(CompileError::InvalidEquality)?;
    if arr.len() != 2 {
        return Err(CompileError::InvalidEquality);
    }
    let condition_type = arr[0]
        .get("var")
        .and_then(|v| v.as_str())
        .ok_or(CompileError::InvalidEquality)?;
    let condition_value = arr[1].clone();
    Ok(json!({ "conditionType": condition_type, "conditionValue": condition_value, "operator": "equals" }))
}

fn lower_existing_step(entry: &Value) -> Result<RawStep, CompileError> {
    let obj = entry
        .as_object()
        .ok_or_else(|| CompileError::InvalidClause(entry.clone()))?;
    let type_str = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CompileError::UnknownStepType("<missing>".into()))?;
    let kind = step_kind_from_str(type_str)
        .ok_or_else(|| CompileError::UnknownStepType(type_str.to_string()))?;
    let data = obj.get("data").cloned().unwrap_or(json!({}));
    let next = obj
        .get("next")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        });
    Ok(RawStep {
        kind,
        data,
        rule: obj.get("rule").cloned().unwrap_or(entry.clone()),
        next,
    })
}

fn step_kind_from_str(s: &str) -> Option<StepKind> {
    match s {
        "action" => Some(StepKind::Action),
        "delay" => Some(StepKind::Delay),
        "condition" => Some(StepKind::Condition),
        "shared-flow" => Some(StepKind::SharedFlow),
        "end" => Some(StepKind::End),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_list_linearizes_to_step_per_clause() {
        let rule = json!({
            "and": [
                { "send_email": { "templateId": "welcome" } },
                { "delay": { "type": "1_day" } },
                { "send_email": { "templateId": "nudge" } },
                { "end": true },
            ]
        });
        let steps = compile(&rule).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].kind, StepKind::Action);
        assert_eq!(steps[1].kind, StepKind::Delay);
        assert_eq!(steps[1].data["delayMs"], 86_400_000);
        assert_eq!(steps[2].kind, StepKind::Action);
        assert_eq!(steps[3].kind, StepKind::End);
        assert_eq!(steps[0].next, vec!["step_1"]);
        assert_eq!(steps[3].next, Vec::<String>::new());
    }

    #[test]
    fn parallel_branches_flatten_in_order() {
        let rule = json!({
            "parallel": {
                "trigger": "subscription_created",
                "branches": [
                    { "and": [{ "send_email": { "templateId": "a" } }] },
                    { "and": [{ "send_sms": { "templateId": "b" } }] },
                ]
            }
        });
        let steps = compile(&rule).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].data["actionType"], "send_email");
        assert_eq!(steps[1].data["actionType"], "send_sms");
    }

    #[test]
    fn single_key_shorthand_becomes_equals_condition() {
        let rule = json!({ "and": [{ "product_package": "package_1" }] });
        let steps = compile(&rule).unwrap();
        assert_eq!(steps[0].kind, StepKind::Condition);
        assert_eq!(steps[0].data["conditionType"], "product_package");
        assert_eq!(steps[0].data["operator"], "equals");
    }

    #[test]
    fn unrecognized_clause_falls_back_to_custom_action() {
        let rule = json!({ "and": [{ "do_something_bespoke": { "x": 1 } }] });
        let steps = compile(&rule).unwrap();
        assert_eq!(steps[0].kind, StepKind::Action);
        assert_eq!(steps[0].data["actionType"], "custom");
    }

    #[test]
    fn unknown_delay_key_falls_back_to_one_second() {
        let rule = json!({ "and": [{ "delay": { "type": "never_heard_of_it" } }] });
        let steps = compile(&rule).unwrap();
        assert_eq!(steps[0].data["delayMs"], 1_000);
    }

    #[test]
    fn compile_is_idempotent_through_passthrough_dialect() {
        let rule = json!({
            "and": [
                { "send_email": { "templateId": "welcome" } },
                { "delay": { "type": "1_week" } },
            ]
        });
        let first = compile(&rule).unwrap();
        let reserialized = rule_for_steps(&first);
        let second = compile(&reserialized).unwrap();
        assert_eq!(first, second);
    }
}
