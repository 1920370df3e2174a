//! Input validation shared by every repository.
//!
//! All failures are [`OtacError::BadRequest`].

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{OtacError, OtacResult};
use crate::models::permission::Extensions;
use crate::models::target::Target;

static RESOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{2,32}$").expect("static regex"));
static TARGET_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z._-]{1,64}$").expect("static regex"));
static SUBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z._:@-]{1,128}$").expect("static regex"));
static ACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z]{2,32}$").expect("static regex"));

/// Size limits applied to listings and batch writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_page_size: u32,
    pub default_page_size: u32,
    pub max_batch: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_page_size: 1000,
            default_page_size: 10,
            max_batch: 1000,
        }
    }
}

pub fn check_resource(s: &str) -> OtacResult<()> {
    if s.is_empty() {
        return Err(OtacError::bad_request("empty resource type"));
    }
    if !RESOURCE_RE.is_match(s) {
        return Err(OtacError::bad_request(format!("invalid resource type {s:?}")));
    }
    Ok(())
}

pub fn check_target(target: &Target) -> OtacResult<()> {
    check_resource(&target.target_type)?;
    if !TARGET_ID_RE.is_match(&target.target_id) {
        return Err(OtacError::bad_request(format!(
            "invalid target id {:?}",
            target.target_id
        )));
    }
    Ok(())
}

/// Organization and OU names share the target id alphabet.
pub fn check_name(kind: &str, s: &str) -> OtacResult<()> {
    if !TARGET_ID_RE.is_match(s) {
        return Err(OtacError::bad_request(format!("invalid {kind} name {s:?}")));
    }
    Ok(())
}

pub fn check_subject(s: &str) -> OtacResult<()> {
    if s.is_empty() {
        return Err(OtacError::bad_request("empty subject"));
    }
    if !SUBJECT_RE.is_match(s) {
        return Err(OtacError::bad_request(format!("invalid subject {s:?}")));
    }
    Ok(())
}

/// Permission names are `resource.action[.action...]`.
pub fn check_permission(s: &str) -> OtacResult<()> {
    if s.is_empty() {
        return Err(OtacError::bad_request("empty permission"));
    }
    let mut segments = s.split('.');
    check_resource(segments.next().unwrap_or_default())?;
    let mut actions = 0;
    for segment in segments {
        if !ACTION_RE.is_match(segment) {
            return Err(OtacError::bad_request(format!("invalid permission {s:?}")));
        }
        actions += 1;
    }
    if actions == 0 {
        return Err(OtacError::bad_request(format!("invalid permission {s:?}")));
    }
    Ok(())
}

pub fn check_term(s: &str) -> OtacResult<()> {
    if s.len() < 3 {
        return Err(OtacError::bad_request(format!("term too short: {}", s.len())));
    }
    if s.len() > 1024 {
        return Err(OtacError::bad_request(format!("term too long: {}", s.len())));
    }
    if s.chars().any(char::is_whitespace) {
        return Err(OtacError::bad_request(format!("invalid term {s:?}")));
    }
    Ok(())
}

pub fn check_terms(terms: &[String]) -> OtacResult<()> {
    terms.iter().try_for_each(|t| check_term(t))
}

/// Extension values must be scalar: string, bool or number.
pub fn check_extensions(extensions: &Extensions) -> OtacResult<()> {
    for (key, value) in extensions {
        match value {
            serde_json::Value::String(_)
            | serde_json::Value::Bool(_)
            | serde_json::Value::Number(_) => {}
            other => {
                return Err(OtacError::bad_request(format!(
                    "unsupported extension value for {key:?}: {other}"
                )));
            }
        }
    }
    Ok(())
}

/// Validate a batch: non-empty, within the limit, no repeated entry, each
/// entry accepted by `check`.
pub fn check_batch<T, K, F, C>(items: &[T], limits: &Limits, key: F, check: C) -> OtacResult<()>
where
    K: Eq + std::hash::Hash + std::fmt::Display,
    F: Fn(&T) -> K,
    C: Fn(&T) -> OtacResult<()>,
{
    if items.is_empty() {
        return Err(OtacError::bad_request("empty batch"));
    }
    if items.len() > limits.max_batch {
        return Err(OtacError::bad_request(format!(
            "too many items: {}",
            items.len()
        )));
    }
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        let k = key(item);
        check(item)?;
        if !seen.insert(k.to_string()) {
            return Err(OtacError::bad_request(format!("{k} is repeated")));
        }
    }
    Ok(())
}

pub fn check_targets(targets: &[Target], limits: &Limits) -> OtacResult<()> {
    check_batch(targets, limits, |t| t.to_string(), check_target)
}

pub fn check_subjects(subjects: &[String], limits: &Limits) -> OtacResult<()> {
    check_batch(subjects, limits, |s| s.clone(), |s| check_subject(s))
}

pub fn check_permissions(permissions: &[String], limits: &Limits) -> OtacResult<()> {
    check_batch(permissions, limits, |p| p.clone(), |p| check_permission(p))
}
