//! Extensible enrollment attributes.
//!
//! Enrollments carry administrator-defined key/value attributes beside the
//! state history (for example a treatment supporter or a transfer-in site).
//! Each attribute references its `ProgramAttributeType` by uuid and carries a
//! typed JSON value. A type holds at most one active value per enrollment;
//! replacing a value voids the old attribute rather than overwriting it, so
//! the previous values stay on the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{Audit, VoidInfo};
use crate::enrollment::PatientProgram;
use crate::ids::UserRef;
use crate::NonEmptyText;

/// An administrator-defined attribute key for enrollments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgramAttributeType {
    uuid: Uuid,
    name: NonEmptyText,
    retired: bool,
}

impl ProgramAttributeType {
    pub fn new(uuid: Uuid, name: NonEmptyText) -> Self {
        Self {
            uuid,
            name,
            retired: false,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn retire(&mut self) {
        self.retired = true;
    }
}

impl PartialEq for ProgramAttributeType {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for ProgramAttributeType {}

/// One value of one attribute type on one enrollment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatientProgramAttribute {
    uuid: Uuid,
    attribute_type_uuid: Uuid,
    value: serde_json::Value,
    audit: Audit,
    void: Option<VoidInfo>,
}

impl PatientProgramAttribute {
    fn new(attribute_type_uuid: Uuid, value: serde_json::Value, by: UserRef) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            attribute_type_uuid,
            value,
            audit: Audit::created_now().with_creator(by),
            void: None,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn attribute_type_uuid(&self) -> Uuid {
        self.attribute_type_uuid
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn audit(&self) -> &Audit {
        &self.audit
    }

    pub fn void_info(&self) -> Option<&VoidInfo> {
        self.void.as_ref()
    }

    pub fn is_voided(&self) -> bool {
        self.void.is_some()
    }
}

impl PatientProgram {
    /// Every attribute record, voided ones included.
    pub fn attributes(&self) -> &[PatientProgramAttribute] {
        &self.attributes
    }

    /// All non-voided attributes.
    pub fn active_attributes(&self) -> Vec<&PatientProgramAttribute> {
        self.attributes.iter().filter(|a| !a.is_voided()).collect()
    }

    /// All non-voided attributes of the given type.
    pub fn active_attributes_of_type(
        &self,
        attribute_type: &ProgramAttributeType,
    ) -> Vec<&PatientProgramAttribute> {
        self.attributes
            .iter()
            .filter(|a| !a.is_voided() && a.attribute_type_uuid() == attribute_type.uuid())
            .collect()
    }

    /// The active value of the given type, if one is set.
    pub fn attribute_value(
        &self,
        attribute_type: &ProgramAttributeType,
    ) -> Option<&serde_json::Value> {
        self.active_attributes_of_type(attribute_type)
            .first()
            .map(|a| a.value())
    }

    /// Set the value of an attribute type on this enrollment.
    ///
    /// If an active attribute of this type already holds the same value the
    /// call is a no-op. Otherwise every active attribute of the type is
    /// voided (keeping the old values on the record) and a new attribute is
    /// appended.
    pub fn set_attribute(
        &mut self,
        attribute_type: &ProgramAttributeType,
        value: serde_json::Value,
        by: UserRef,
        at: DateTime<Utc>,
    ) {
        let existing = self.active_attributes_of_type(attribute_type);
        if existing.len() == 1 && existing[0].value() == &value {
            return;
        }

        let type_uuid = attribute_type.uuid();
        for attribute in &mut self.attributes {
            if !attribute.is_voided() && attribute.attribute_type_uuid() == type_uuid {
                attribute.void = Some(VoidInfo::new(by, at, "replaced by a newer value"));
            }
        }
        self.attributes
            .push(PatientProgramAttribute::new(type_uuid, value, by));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::Concept;
    use crate::ids::PatientRef;
    use crate::program::Program;
    use serde_json::json;

    fn enrollment() -> PatientProgram {
        let program = Program::new(
            Uuid::new_v4(),
            Concept::new(
                Uuid::new_v4(),
                NonEmptyText::new("HIV Program").expect("name"),
                "en",
            ),
        );
        PatientProgram::enroll(PatientRef::new(Uuid::new_v4()), &program, None, None)
    }

    fn supporter_type() -> ProgramAttributeType {
        ProgramAttributeType::new(
            Uuid::new_v4(),
            NonEmptyText::new("Treatment supporter").expect("name"),
        )
    }

    fn user() -> UserRef {
        UserRef::new(Uuid::new_v4())
    }

    #[test]
    fn setting_an_attribute_makes_it_the_single_active_value() {
        let mut enrollment = enrollment();
        let supporter = supporter_type();

        enrollment.set_attribute(&supporter, json!("Alice"), user(), Utc::now());
        assert_eq!(enrollment.attribute_value(&supporter), Some(&json!("Alice")));
        assert_eq!(enrollment.active_attributes().len(), 1);
    }

    #[test]
    fn replacing_a_value_voids_the_old_attribute() {
        let mut enrollment = enrollment();
        let supporter = supporter_type();
        let actor = user();

        enrollment.set_attribute(&supporter, json!("Alice"), actor, Utc::now());
        enrollment.set_attribute(&supporter, json!("Bob"), actor, Utc::now());

        assert_eq!(enrollment.attribute_value(&supporter), Some(&json!("Bob")));
        assert_eq!(enrollment.active_attributes_of_type(&supporter).len(), 1);
        assert_eq!(enrollment.attributes().len(), 2, "old value stays voided");
        let voided = enrollment
            .attributes()
            .iter()
            .find(|a| a.is_voided())
            .expect("one voided attribute");
        assert_eq!(voided.value(), &json!("Alice"));
    }

    #[test]
    fn setting_the_same_value_again_is_a_no_op() {
        let mut enrollment = enrollment();
        let supporter = supporter_type();
        let actor = user();

        enrollment.set_attribute(&supporter, json!("Alice"), actor, Utc::now());
        enrollment.set_attribute(&supporter, json!("Alice"), actor, Utc::now());

        assert_eq!(enrollment.attributes().len(), 1);
    }

    #[test]
    fn attribute_types_are_independent() {
        let mut enrollment = enrollment();
        let supporter = supporter_type();
        let site = ProgramAttributeType::new(
            Uuid::new_v4(),
            NonEmptyText::new("Transfer-in site").expect("name"),
        );
        let actor = user();

        enrollment.set_attribute(&supporter, json!("Alice"), actor, Utc::now());
        enrollment.set_attribute(&site, json!({"site": "Central clinic"}), actor, Utc::now());

        assert_eq!(enrollment.active_attributes().len(), 2);
        assert_eq!(enrollment.attribute_value(&supporter), Some(&json!("Alice")));
    }
}
