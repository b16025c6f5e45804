//! Field-level access policy for self-service record forms
//!
//! One declarative table decides, per operation, which fields a member may
//! edit. Identifiers and classifications the organization assigns are
//! locked; the phone a token was issued for is locked to the token's
//! subject.

use crate::format::{normalize_phone, to_national};
use crate::record::{MemberField, MemberRecord};
use crate::token::CapabilityToken;
use std::collections::BTreeMap;

/// What a self-service form does with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create a record that does not exist yet
    Create,
    /// Update the record the token is scoped to
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
        }
    }
}

/// Per-operation row of the policy table.
#[derive(Debug, Clone, Copy)]
pub struct OperationRule {
    pub operation: Operation,
    /// Fields the member never edits directly
    pub blocked: &'static [MemberField],
    /// Field the token subject is bound to, if any
    pub token_binds: Option<MemberField>,
}

/// Fields locked when a member creates their own record.
pub const CREATE_BLOCKED: &[MemberField] = &[MemberField::Id, MemberField::TipoMembro];

/// Fields locked when a member updates their record. Office is assigned by
/// the organization, so it joins the create list here.
pub const UPDATE_BLOCKED: &[MemberField] =
    &[MemberField::Id, MemberField::TipoMembro, MemberField::Oficio];

/// Row applied to record creation.
pub const CREATE_RULE: OperationRule = OperationRule {
    operation: Operation::Create,
    blocked: CREATE_BLOCKED,
    token_binds: Some(MemberField::Celular),
};

/// Row applied to record updates.
pub const UPDATE_RULE: OperationRule = OperationRule {
    operation: Operation::Update,
    blocked: UPDATE_BLOCKED,
    token_binds: None,
};

/// The policy table.
pub const POLICY_TABLE: &[OperationRule] = &[CREATE_RULE, UPDATE_RULE];

impl OperationRule {
    pub fn for_operation(operation: Operation) -> &'static OperationRule {
        match operation {
            Operation::Create => &CREATE_RULE,
            Operation::Update => &UPDATE_RULE,
        }
    }
}

/// Access decision for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldAccess {
    Editable,
    /// Read-only, carrying the value decoded from the token
    LockedPrefilled(String),
    /// Read-only, no prefill
    LockedBlank,
}

impl FieldAccess {
    pub fn is_editable(&self) -> bool {
        matches!(self, FieldAccess::Editable)
    }
}

/// Per-field decisions computed once for an access context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    operation: Operation,
    fields: BTreeMap<MemberField, FieldAccess>,
}

impl AccessDecision {
    /// Decide every field for `operation`.
    ///
    /// `bound` is the identity field the token bound together with its
    /// prefill value. A bound field is always locked to that value; other
    /// blocked fields are locked blank.
    pub fn compute(operation: Operation, bound: Option<(MemberField, String)>) -> Self {
        let rule = OperationRule::for_operation(operation);
        let mut fields: BTreeMap<MemberField, FieldAccess> = MemberField::ALL
            .iter()
            .map(|field| {
                let access = if rule.blocked.contains(field) {
                    FieldAccess::LockedBlank
                } else {
                    FieldAccess::Editable
                };
                (*field, access)
            })
            .collect();

        if let Some((field, value)) = bound {
            fields.insert(field, FieldAccess::LockedPrefilled(value));
        }

        Self { operation, fields }
    }

    /// Decide from a token, binding the field the operation binds to the
    /// decoded subject. An undecodable token simply binds nothing.
    pub fn for_token(operation: Operation, token: &CapabilityToken, country_code: &str) -> Self {
        let rule = OperationRule::for_operation(operation);
        let bound = rule.token_binds.and_then(|field| {
            token
                .decode()
                .map(|claims| (field, normalize_phone(&to_national(&claims.subject, country_code))))
        });
        Self::compute(operation, bound)
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn access(&self, field: MemberField) -> &FieldAccess {
        self.fields.get(&field).unwrap_or(&FieldAccess::LockedBlank)
    }

    pub fn is_editable(&self, field: MemberField) -> bool {
        self.access(field).is_editable()
    }

    /// Fields that are not editable, in form order.
    pub fn locked_fields(&self) -> Vec<MemberField> {
        MemberField::ALL
            .iter()
            .copied()
            .filter(|field| !self.is_editable(*field))
            .collect()
    }

    /// Write token prefills into a record.
    pub fn apply_prefill(&self, record: &mut MemberRecord) {
        for (field, access) in &self.fields {
            if let FieldAccess::LockedPrefilled(value) = access {
                record.set(*field, value.clone());
            }
        }
    }

    /// Reset every locked field of `edited` to what `baseline` holds, then
    /// re-apply prefills. Whatever the client did to a locked field is
    /// discarded before anything is sent.
    pub fn enforce(&self, baseline: &MemberRecord, edited: &mut MemberRecord) {
        for (field, access) in &self.fields {
            match access {
                FieldAccess::Editable => {}
                FieldAccess::LockedPrefilled(value) => edited.set(*field, value.clone()),
                FieldAccess::LockedBlank => edited.set(*field, baseline.get(*field).to_string()),
            }
        }
    }
}
