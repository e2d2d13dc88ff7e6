//! Form dependency manager
//!
//! Keeps input controls consistent with a static dependency table: a gated
//! field is disabled while any of its gating toggles is on, and toggles in an
//! exclusive group switch their siblings off. The controller locks the whole
//! form for the duration of a job.

use gloome_common::config::FormDependencyConfig;
use gloome_common::{FieldValue, FormValues};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

pub const TREE_FIELD: &str = "newickText";
pub const ALIGNMENT_FIELD: &str = "patternMSA";
pub const RADIAL_TOGGLE: &str = "is_radial_tree";
pub const DISTANCE_TOGGLE: &str = "show_distance_to_parent";
const NO_EMAIL_TOGGLE: &str = "is_do_not_use_e_mail";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    #[error("unknown control `{0}`")]
    UnknownControl(String),

    #[error("form dependencies are already registered")]
    AlreadyRegistered,

    #[error("control `{0}` is not a toggle")]
    NotAToggle(String),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Toggle,
    Number,
    Text,
}

/// Observable state of one control
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlState {
    pub id: String,
    pub kind: ControlKind,
    pub value: FieldValue,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct FormManager {
    kinds: BTreeMap<String, ControlKind>,
    values: FormValues,
    dependencies: BTreeMap<String, Vec<String>>,
    exclusive_groups: Vec<Vec<String>>,
    /// Fields currently disabled by gating
    gated: BTreeSet<String>,
    locked: bool,
    registered: bool,
}

impl Default for FormManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FormManager {
    /// The GLOOME controls with their defaults, no dependencies registered
    pub fn new() -> Self {
        let mut form = Self {
            kinds: BTreeMap::new(),
            values: FormValues::new(),
            dependencies: BTreeMap::new(),
            exclusive_groups: Vec::new(),
            gated: BTreeSet::new(),
            locked: false,
            registered: false,
        };
        form.add_control(TREE_FIELD, ControlKind::Text, "");
        form.add_control(ALIGNMENT_FIELD, ControlKind::Text, "");
        form.add_control("categories_quantity", ControlKind::Number, FieldValue::Number(4.0));
        form.add_control("alpha", ControlKind::Number, FieldValue::Number(0.5));
        form.add_control("pi_1", ControlKind::Number, FieldValue::Number(0.5));
        form.add_control("coefficient_bl", ControlKind::Number, FieldValue::Number(1.0));
        form.add_control("e_mail", ControlKind::Text, "");
        for (id, on) in [
            ("is_optimize_pi", true),
            ("is_optimize_pi_average", false),
            ("is_optimize_alpha", true),
            ("is_optimize_bl", true),
            (NO_EMAIL_TOGGLE, true),
            ("file_interactive_tree_html", false),
            ("file_newick_tree_png", false),
            ("file_table_of_nodes_tsv", true),
            ("file_table_of_branches_tsv", true),
            ("file_log_likelihood_tsv", true),
            ("file_table_of_attributes_tsv", true),
            (RADIAL_TOGGLE, false),
            (DISTANCE_TOGGLE, false),
        ] {
            form.add_control(id, ControlKind::Toggle, on);
        }
        form
    }

    /// Default controls with the given dependency table registered
    pub fn with_dependencies(config: &FormDependencyConfig) -> Result<Self, FormError> {
        let mut form = Self::new();
        form.register_dependencies(config)?;
        Ok(form)
    }

    pub fn add_control(&mut self, id: &str, kind: ControlKind, value: impl Into<FieldValue>) {
        self.kinds.insert(id.to_string(), kind);
        self.values.insert(id.to_string(), value.into());
    }

    /// Load the dependency table; allowed once
    pub fn register_dependencies(&mut self, config: &FormDependencyConfig) -> Result<(), FormError> {
        if self.registered {
            return Err(FormError::AlreadyRegistered);
        }
        for (field, toggles) in &config.dependencies {
            self.require_control(field)?;
            for toggle in toggles {
                self.require_toggle(toggle)?;
            }
        }
        for toggle in config.exclusive_groups.iter().flatten() {
            self.require_toggle(toggle)?;
        }

        self.dependencies = config.dependencies.clone();
        self.exclusive_groups = config.exclusive_groups.clone();
        self.registered = true;
        self.recompute_all();
        debug!(
            fields = self.dependencies.len(),
            groups = self.exclusive_groups.len(),
            "Registered form dependencies"
        );
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    fn require_control(&self, id: &str) -> Result<ControlKind, FormError> {
        self.kinds
            .get(id)
            .copied()
            .ok_or_else(|| FormError::UnknownControl(id.to_string()))
    }

    fn require_toggle(&self, id: &str) -> Result<(), FormError> {
        match self.require_control(id)? {
            ControlKind::Toggle => Ok(()),
            _ => Err(FormError::NotAToggle(id.to_string())),
        }
    }

    fn toggle_on(&self, id: &str) -> bool {
        self.values.get(id).map(FieldValue::as_bool).unwrap_or(false)
    }

    fn recompute(&mut self, field: &str) {
        let Some(toggles) = self.dependencies.get(field) else {
            return;
        };
        if toggles.iter().any(|t| self.toggle_on(t)) {
            self.gated.insert(field.to_string());
        } else {
            self.gated.remove(field);
        }
    }

    fn recompute_all(&mut self) {
        let fields: Vec<String> = self.dependencies.keys().cloned().collect();
        for field in fields {
            self.recompute(&field);
        }
    }

    /// A toggle changed
    ///
    /// Switching on a member of an exclusive group switches its siblings off.
    /// Fields gated by the toggle or by any member of its group are then
    /// recomputed; other fields are left alone.
    pub fn on_toggle(&mut self, id: &str, value: bool) -> Result<(), FormError> {
        self.require_toggle(id)?;
        self.values.insert(id.to_string(), FieldValue::Bool(value));

        let mut touched: BTreeSet<String> = BTreeSet::from([id.to_string()]);
        for group in self.exclusive_groups.iter().filter(|g| g.iter().any(|t| t == id)) {
            for sibling in group {
                touched.insert(sibling.clone());
            }
        }
        if value {
            for sibling in touched.iter().filter(|t| t.as_str() != id) {
                self.values.insert(sibling.clone(), FieldValue::Bool(false));
            }
        }

        let affected: Vec<String> = self
            .dependencies
            .iter()
            .filter(|(_, toggles)| toggles.iter().any(|t| touched.contains(t)))
            .map(|(field, _)| field.clone())
            .collect();
        for field in affected {
            self.recompute(&field);
        }
        Ok(())
    }

    /// Set a control from user input; toggles go through [`FormManager::on_toggle`]
    pub fn set_value(&mut self, id: &str, value: FieldValue) -> Result<(), FormError> {
        match self.require_control(id)? {
            ControlKind::Toggle => self.on_toggle(id, value.as_bool()),
            ControlKind::Number => {
                let number = value
                    .as_f64()
                    .ok_or_else(|| FormError::Invalid(format!("`{}` must be a number, got `{}`", id, value)))?;
                self.values.insert(id.to_string(), FieldValue::Number(number));
                Ok(())
            }
            ControlKind::Text => {
                self.values.insert(id.to_string(), FieldValue::Text(value.to_string()));
                Ok(())
            }
        }
    }

    /// Keep at most one member of each exclusive group on, the first in group order
    fn enforce_exclusive_groups(&mut self) {
        for group in &self.exclusive_groups {
            let mut seen_on = false;
            for id in group {
                let on = self.values.get(id).is_some_and(FieldValue::as_bool);
                if on && seen_on {
                    debug!(control = %id, "Switching off second member of exclusive group");
                    self.values.insert(id.clone(), FieldValue::Bool(false));
                }
                seen_on |= on;
            }
        }
    }

    /// Write echoed values back into the controls, then recompute all gating
    ///
    /// Exclusive groups are re-applied first, so an echo with two members on
    /// keeps only the first.
    pub fn refill(&mut self, values: &FormValues) {
        for (id, value) in values {
            let Some(kind) = self.kinds.get(id).copied() else {
                debug!(control = %id, "Ignoring echoed value for unknown control");
                continue;
            };
            let value = match kind {
                ControlKind::Toggle => FieldValue::Bool(value.as_bool()),
                ControlKind::Number => match value.as_f64() {
                    Some(n) => FieldValue::Number(n),
                    None => {
                        debug!(control = %id, value = %value, "Ignoring non-numeric echoed value");
                        continue;
                    }
                },
                ControlKind::Text => FieldValue::Text(value.to_string()),
            };
            self.values.insert(id.clone(), value);
        }
        self.enforce_exclusive_groups();
        self.recompute_all();
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Enabled iff not locked and no gating toggle is on
    pub fn is_enabled(&self, id: &str) -> bool {
        !self.locked && !self.gated.contains(id)
    }

    pub fn value(&self, id: &str) -> Option<&FieldValue> {
        self.values.get(id)
    }

    pub fn toggle(&self, id: &str) -> bool {
        self.toggle_on(id)
    }

    pub fn values(&self) -> FormValues {
        self.values.clone()
    }

    pub fn control_states(&self) -> Vec<ControlState> {
        self.values
            .iter()
            .map(|(id, value)| ControlState {
                id: id.clone(),
                kind: self.kinds.get(id).copied().unwrap_or(ControlKind::Text),
                value: value.clone(),
                enabled: self.is_enabled(id),
            })
            .collect()
    }

    /// Reset the tree and alignment text
    pub fn clear_inputs(&mut self) {
        for id in [TREE_FIELD, ALIGNMENT_FIELD] {
            self.values.insert(id.to_string(), FieldValue::Text(String::new()));
        }
    }

    /// Reject input the remote would refuse anyway
    pub fn validate(&self) -> Result<(), FormError> {
        let number = |id: &str| -> Result<f64, FormError> {
            self.values
                .get(id)
                .and_then(FieldValue::as_f64)
                .ok_or_else(|| FormError::Invalid(format!("`{}` must be a number", id)))
        };
        let in_range = |id: &str, min: f64, max: f64| -> Result<(), FormError> {
            let v = number(id)?;
            if (min..=max).contains(&v) {
                Ok(())
            } else {
                Err(FormError::Invalid(format!("`{}` must be between {} and {}, got {}", id, min, max, v)))
            }
        };

        let categories = number("categories_quantity")?;
        if categories.fract() != 0.0 || !(1.0..=16.0).contains(&categories) {
            return Err(FormError::Invalid(format!(
                "`categories_quantity` must be an integer between 1 and 16, got {}",
                categories
            )));
        }
        in_range("alpha", 0.1, 20.0)?;
        in_range("pi_1", 0.001, 0.999)?;
        in_range("coefficient_bl", 0.1, 10.0)?;

        if !self.toggle_on(NO_EMAIL_TOGGLE) {
            let email = self.text(self.values.get("e_mail"));
            if !looks_like_email(&email) {
                return Err(FormError::Invalid(format!("`{}` is not a valid e-mail address", email)));
            }
        }

        validate_newick(&self.text(self.values.get(TREE_FIELD)))?;
        let alignment = self.text(self.values.get(ALIGNMENT_FIELD));
        if !alignment.starts_with('>') {
            return Err(FormError::Invalid("alignment must be FASTA text starting with `>`".into()));
        }
        Ok(())
    }

    fn text(&self, value: Option<&FieldValue>) -> String {
        value.map(|v| v.to_string().trim().to_string()).unwrap_or_default()
    }

    /// Form-encoded parameters: tree and alignment first, then every control
    pub fn submission_parameters(&self) -> Vec<(String, String)> {
        let mut params = vec![
            (TREE_FIELD.to_string(), self.text(self.values.get(TREE_FIELD))),
            (ALIGNMENT_FIELD.to_string(), self.text(self.values.get(ALIGNMENT_FIELD))),
        ];
        params.extend(
            self.values
                .iter()
                .filter(|(id, _)| id.as_str() != TREE_FIELD && id.as_str() != ALIGNMENT_FIELD)
                .map(|(id, v)| (id.clone(), v.to_form_string())),
        );
        params
    }
}

fn looks_like_email(text: &str) -> bool {
    match text.split_once('@') {
        Some((user, domain)) => {
            !user.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !text.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn validate_newick(text: &str) -> Result<(), FormError> {
    if !text.starts_with('(') || !text.ends_with(';') {
        return Err(FormError::Invalid("tree must be Newick text starting with `(` and ending with `;`".into()));
    }
    let mut depth: i64 = 0;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(FormError::Invalid("tree has an unmatched `)`".into()));
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(FormError::Invalid("tree has an unclosed `(`".into()));
    }
    Ok(())
}
