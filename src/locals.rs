//! Fixed-point evaluation of Terraform `locals` and `output` values.

use crate::error::{Error, Result};
use crate::fsguard;
use crate::model::Environment;
use hcl::eval::{Context, Evaluate, FuncArgs, FuncDef, ParamType};
use hcl::expr::{Expression, ObjectKey, Operation, TemplateExpr, TraversalOperator};
use hcl::{Body, Value};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

/// Resolved values of one module directory.
#[derive(Debug, Clone, Default)]
pub struct Locals {
    values: BTreeMap<String, serde_json::Value>,
    unresolved: Vec<String>,
}

impl Locals {
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.values.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&serde_json::Value> {
        self.values
            .get(name)
            .ok_or_else(|| Error::NotResolved(name.to_string()))
    }

    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

struct Pending {
    name: String,
    expr: Expression,
    weight: usize,
}

/// Reads every `*.tf` file directly under `dir` and resolves its locals.
pub fn resolve_dir(base: &Path, dir: &Path, env: &Environment) -> Result<Locals> {
    let mut pending = Vec::new();
    for file in fsguard::list_files(dir, "tf")? {
        let source = fsguard::read_to_string(base, &file, &["tf"])?;
        parse_into(&file, &source, &mut pending)?;
    }
    Ok(resolve(pending, env))
}

/// Resolves locals from in-memory HCL sources.
#[cfg(test)]
pub fn resolve_sources(sources: &[&str], env: &Environment) -> Result<Locals> {
    let mut pending = Vec::new();
    for (idx, source) in sources.iter().enumerate() {
        parse_into(format!("<source {idx}>"), source, &mut pending)?;
    }
    Ok(resolve(pending, env))
}

fn parse_into(
    label: impl Into<std::path::PathBuf>,
    source: &str,
    pending: &mut Vec<Pending>,
) -> Result<()> {
    let body = hcl::parse(source).map_err(|error| Error::parse(label, error))?;
    collect(&body, pending);
    Ok(())
}

fn collect(body: &Body, pending: &mut Vec<Pending>) {
    for block in body.blocks() {
        match block.identifier() {
            "locals" => {
                for attr in block.body().attributes() {
                    pending.push(Pending {
                        name: attr.key().to_string(),
                        expr: attr.expr().clone(),
                        weight: 0,
                    });
                }
            }
            "output" => {
                let Some(label) = block.labels().first() else {
                    continue;
                };
                if let Some(value) = block.body().attributes().find(|attr| attr.key() == "value") {
                    pending.push(Pending {
                        name: label.as_str().to_string(),
                        expr: value.expr().clone(),
                        weight: 0,
                    });
                }
            }
            _ => {}
        }
    }
}

fn resolve(mut pending: Vec<Pending>, env: &Environment) -> Locals {
    for entry in &mut pending {
        entry.weight = free_variables(&entry.expr).len();
    }
    pending.sort_by(|a, b| a.weight.cmp(&b.weight).then_with(|| a.name.cmp(&b.name)));

    let mut resolved: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    let mut pass = 0;

    loop {
        pass += 1;
        let ctx = match build_context(env, &resolved) {
            Ok(ctx) => ctx,
            Err(error) => {
                warn!(%error, "failed to build evaluation context");
                break;
            }
        };

        let mut produced = Vec::new();
        let mut remaining = Vec::new();
        for entry in pending {
            match entry.expr.evaluate(&ctx) {
                Ok(value) => match serde_json::to_value(&value) {
                    Ok(value) => produced.push((entry.name, value)),
                    Err(error) => {
                        debug!(name = %entry.name, %error, "failed to convert local");
                        remaining.push(entry);
                    }
                },
                Err(_) => remaining.push(entry),
            }
        }

        debug!(pass, resolved = produced.len(), remaining = remaining.len(), "locals pass");
        pending = remaining;
        if produced.is_empty() {
            break;
        }
        resolved.extend(produced);
    }

    let ctx = build_context(env, &resolved).ok();
    let mut unresolved = Vec::new();
    for entry in pending {
        let reason = ctx
            .as_ref()
            .and_then(|ctx| entry.expr.evaluate(ctx).err())
            .map(|error| error.to_string())
            .unwrap_or_default();
        debug!(name = %entry.name, %reason, "local did not resolve");
        unresolved.push(entry.name);
    }
    unresolved.sort();

    Locals {
        values: resolved,
        unresolved,
    }
}

/// Names of `local.*` references inside an expression.
pub fn free_variables(expr: &Expression) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    walk(expr, &mut names);
    names
}

fn walk(expr: &Expression, names: &mut BTreeSet<String>) {
    match expr {
        Expression::Traversal(traversal) => {
            if let Expression::Variable(root) = &traversal.expr
                && root.as_str() == "local"
                && let Some(TraversalOperator::GetAttr(attr)) = traversal.operators.first()
            {
                names.insert(attr.as_str().to_string());
            } else {
                walk(&traversal.expr, names);
            }
            for operator in &traversal.operators {
                if let TraversalOperator::Index(index) = operator {
                    walk(index, names);
                }
            }
        }
        Expression::Array(items) => items.iter().for_each(|item| walk(item, names)),
        Expression::Object(object) => {
            for (key, value) in object {
                if let ObjectKey::Expression(key) = key {
                    walk(key, names);
                }
                walk(value, names);
            }
        }
        Expression::FuncCall(call) => call.args.iter().for_each(|arg| walk(arg, names)),
        Expression::Parenthesis(inner) => walk(inner, names),
        Expression::Conditional(cond) => {
            walk(&cond.cond_expr, names);
            walk(&cond.true_expr, names);
            walk(&cond.false_expr, names);
        }
        Expression::Operation(operation) => match operation.as_ref() {
            Operation::Unary(unary) => walk(&unary.expr, names),
            Operation::Binary(binary) => {
                walk(&binary.lhs_expr, names);
                walk(&binary.rhs_expr, names);
            }
        },
        Expression::ForExpr(for_expr) => {
            walk(&for_expr.collection_expr, names);
            if let Some(key) = &for_expr.key_expr {
                walk(key, names);
            }
            walk(&for_expr.value_expr, names);
            if let Some(cond) = &for_expr.cond_expr {
                walk(cond, names);
            }
        }
        Expression::TemplateExpr(template) => {
            let raw = match template.as_ref() {
                TemplateExpr::QuotedString(raw) => raw.as_str(),
                TemplateExpr::Heredoc(heredoc) => heredoc.template.as_str(),
            };
            scan_template(raw, names);
        }
        _ => {}
    }
}

fn scan_template(raw: &str, names: &mut BTreeSet<String>) {
    for (idx, _) in raw.match_indices("local.") {
        let name = raw[idx + "local.".len()..]
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-')
            .collect::<String>();
        if !name.is_empty() {
            names.insert(name);
        }
    }
}

fn execution_target(env: &Environment) -> serde_json::Value {
    json!({
        "region": {
            "realm": env.realm,
            "public_name": env.region,
            "public_domain_name": "example.com",
        },
        "tenancy_ocid": "ocid1.tenancy.oc1..example",
        "additional_locals": {
            "environment": env.env_type,
        },
    })
}

fn build_context(
    env: &Environment,
    resolved: &BTreeMap<String, serde_json::Value>,
) -> std::result::Result<Context<'static>, hcl::Error> {
    let mut local = serde_json::Map::new();
    local.insert("execution_target".to_string(), execution_target(env));
    for (name, value) in resolved {
        local.insert(name.clone(), value.clone());
    }

    let var = json!({ "region": env.region, "environment": env.env_type });
    let data = json!({
        "oci_identity_availability_domains": {
            "ad_list": { "availability_domains": [{ "name": "AD-1" }] }
        },
        "oci_objectstorage_namespace": {
            "objectstorage_namespace": { "namespace": "NAMESPACE" }
        },
    });

    let mut ctx = Context::new();
    ctx.declare_var("local", hcl::to_value(serde_json::Value::Object(local))?);
    ctx.declare_var("var", hcl::to_value(var)?);
    ctx.declare_var("data", hcl::to_value(data)?);

    let any = || FuncDef::builder().variadic_param(ParamType::Any);
    ctx.declare_func("format", any().build(format_fn));
    ctx.declare_func("lookup", any().build(lookup_fn));
    ctx.declare_func("merge", any().build(merge_fn));
    ctx.declare_func("join", any().build(join_fn));
    ctx.declare_func("contains", any().build(contains_fn));
    ctx.declare_func("keys", any().build(keys_fn));
    ctx.declare_func("flatten", any().build(flatten_fn));
    Ok(ctx)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn format_fn(args: FuncArgs) -> std::result::Result<Value, String> {
    let Some(Value::String(pattern)) = args.first() else {
        return Err("format: first argument must be a string".to_string());
    };

    let mut rest = args.iter().skip(1);
    let mut out = String::new();
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s' | 'd' | 'v') => {
                let arg = rest
                    .next()
                    .ok_or_else(|| "format: not enough arguments".to_string())?;
                out.push_str(&display(arg));
            }
            Some(other) => return Err(format!("format: unsupported verb %{other}")),
            None => return Err("format: trailing %".to_string()),
        }
    }
    Ok(Value::String(out))
}

fn lookup_fn(args: FuncArgs) -> std::result::Result<Value, String> {
    let (Some(Value::Object(map)), Some(Value::String(key))) = (args.first(), args.get(1)) else {
        return Err("lookup: expected (object, string[, default])".to_string());
    };
    match map.get(key.as_str()) {
        Some(value) => Ok(value.clone()),
        None => args
            .get(2)
            .cloned()
            .ok_or_else(|| format!("lookup: key {key} not found")),
    }
}

fn merge_fn(args: FuncArgs) -> std::result::Result<Value, String> {
    let mut merged = hcl::Map::new();
    for arg in args.iter() {
        match arg {
            Value::Object(map) => {
                for (key, value) in map {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Value::Null => {}
            _ => return Err("merge: arguments must be objects".to_string()),
        }
    }
    Ok(Value::Object(merged))
}

fn join_fn(args: FuncArgs) -> std::result::Result<Value, String> {
    let Some(Value::String(separator)) = args.first() else {
        return Err("join: separator must be a string".to_string());
    };
    let mut parts = Vec::new();
    for arg in args.iter().skip(1) {
        let Value::Array(items) = arg else {
            return Err("join: expected lists".to_string());
        };
        parts.extend(items.iter().map(display));
    }
    Ok(Value::String(parts.join(separator)))
}

fn contains_fn(args: FuncArgs) -> std::result::Result<Value, String> {
    let (Some(Value::Array(items)), Some(needle)) = (args.first(), args.get(1)) else {
        return Err("contains: expected (list, value)".to_string());
    };
    Ok(Value::Bool(items.contains(needle)))
}

fn keys_fn(args: FuncArgs) -> std::result::Result<Value, String> {
    let Some(Value::Object(map)) = args.first() else {
        return Err("keys: expected an object".to_string());
    };
    let mut keys = map.keys().cloned().collect::<Vec<_>>();
    keys.sort();
    Ok(Value::Array(keys.into_iter().map(Value::String).collect()))
}

fn flatten_fn(args: FuncArgs) -> std::result::Result<Value, String> {
    fn push(value: &Value, out: &mut Vec<Value>) {
        match value {
            Value::Array(items) => items.iter().for_each(|item| push(item, out)),
            other => out.push(other.clone()),
        }
    }

    let Some(Value::Array(items)) = args.first() else {
        return Err("flatten: expected a list".to_string());
    };
    let mut out = Vec::new();
    items.iter().for_each(|item| push(item, &mut out));
    Ok(Value::Array(out))
}
