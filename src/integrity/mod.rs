use crate::document::{self, Document};
use crate::error::{StoreError, Violation};
use crate::schema::{IntegrityRules, RangeKind, RangeRule, Reference, UniqueKey};
use crate::store::{DocumentStore, Filter};

/// Check a document against its collection's cross-document rules before
/// it is written.
///
/// Every failed rule is collected rather than stopping at the first, so a
/// caller can report the whole contract breach at once. Store read faults
/// abort with `Err`. Uniqueness checks here are read-then-write and
/// therefore racy; the store's unique indexes remain the final arbiter.
pub fn check_document(
    rules: &IntegrityRules,
    collection: &str,
    doc: &Document,
    store: &dyn DocumentStore,
) -> Result<Vec<Violation>, StoreError> {
    let mut violations = Vec::new();
    for key in &rules.unique_keys {
        check_unique(key, collection, doc, store, &mut violations)?;
    }
    for reference in &rules.references {
        check_reference(reference, doc, store, &mut violations)?;
    }
    for rule in &rules.range_rules {
        check_range(rule, doc, &mut violations);
    }
    Ok(violations)
}

fn check_unique(
    key: &UniqueKey,
    collection: &str,
    doc: &Document,
    store: &dyn DocumentStore,
    out: &mut Vec<Violation>,
) -> Result<(), StoreError> {
    let mut filter = Filter::all();
    let mut values = Vec::with_capacity(key.fields.len());
    for field in &key.fields {
        // A key with an absent field does not apply; required-field gaps
        // are the validator's to report.
        let value = match document::get(doc, field) {
            Some(v) => v,
            None => return Ok(()),
        };
        filter = filter.eq(field, value.clone());
        values.push(document::render(value));
    }

    if store.find_one(collection, &filter)?.is_some() {
        out.push(Violation::DuplicateKey {
            fields: key.fields.clone(),
            values,
        });
    }
    Ok(())
}

fn check_reference(
    reference: &Reference,
    doc: &Document,
    store: &dyn DocumentStore,
    out: &mut Vec<Violation>,
) -> Result<(), StoreError> {
    let value = match document::get(doc, &reference.field) {
        Some(v) => v,
        None => return Ok(()),
    };

    let mut filter = Filter::all().eq(&reference.target_field, value.clone());
    for (field, expected) in &reference.conditions {
        filter = filter.eq(field, expected.as_str());
    }

    if store.find_one(&reference.collection, &filter)?.is_none() {
        out.push(Violation::DanglingReference {
            field: reference.field.clone(),
            value: document::render(value),
        });
    }
    Ok(())
}

fn check_range(rule: &RangeRule, doc: &Document, out: &mut Vec<Violation>) {
    let value = match document::get(doc, &rule.field) {
        Some(v) => v,
        None => return,
    };

    let broken = match &rule.kind {
        RangeKind::Min(min) => value.as_f64().map_or(false, |n| n < *min),
        RangeKind::Between(lo, hi) => value.as_f64().map_or(false, |n| n < *lo || n > *hi),
        RangeKind::NotBefore(other_field) => {
            let at = document::parse_date(value);
            let floor = document::get(doc, other_field).and_then(document::parse_date);
            match (at, floor) {
                (Some(at), Some(floor)) => at < floor,
                _ => false,
            }
        }
    };

    if broken {
        out.push(Violation::BusinessRule {
            rule: rule.name.clone(),
            value: document::render(value),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::catalog;
    use crate::setup;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        setup::provision(&store).unwrap();
        store
            .insert(
                catalog::USERS,
                doc(json!({
                    "userId": "U1",
                    "email": "maria@example.com",
                    "firstName": "Maria",
                    "lastName": "Lopez",
                    "role": "instructor",
                    "dateJoined": "2023-11-01T00:00:00Z",
                    "isActive": true
                })),
            )
            .unwrap();
        store
            .insert(
                catalog::USERS,
                doc(json!({
                    "userId": "U2",
                    "email": "sam@example.com",
                    "firstName": "Sam",
                    "lastName": "Chen",
                    "role": "student",
                    "dateJoined": "2024-01-05T00:00:00Z",
                    "isActive": true
                })),
            )
            .unwrap();
        store
            .insert(
                catalog::COURSES,
                doc(json!({
                    "courseId": "C1",
                    "title": "Databases",
                    "instructorId": "U1",
                    "level": "beginner",
                    "duration": 10,
                    "price": 80.0,
                    "createdAt": "2024-01-10T00:00:00Z",
                    "isPublished": true
                })),
            )
            .unwrap();
        store
            .insert(
                catalog::ENROLLMENTS,
                doc(json!({
                    "studentId": "U2",
                    "courseId": "C1",
                    "enrollmentDate": "2024-02-01T00:00:00Z",
                    "completed": false
                })),
            )
            .unwrap();
        store
    }

    fn rules(collection: &str) -> IntegrityRules {
        catalog::registry().rules(collection).unwrap().clone()
    }

    #[test]
    fn test_composite_key_applies_to_the_exact_pair() {
        let store = seeded_store();
        let enrollment = doc(json!({
            "studentId": "U2",
            "courseId": "C1",
            "enrollmentDate": "2024-03-01T00:00:00Z",
            "completed": false
        }));
        // Same student, different course would be clean; same pair is not.
        let fresh = doc(json!({
            "studentId": "U2",
            "courseId": "C2",
            "enrollmentDate": "2024-03-01T00:00:00Z",
            "completed": false
        }));

        let violations =
            check_document(&rules(catalog::ENROLLMENTS), catalog::ENROLLMENTS, &enrollment, &store)
                .unwrap();
        assert_eq!(
            violations,
            vec![Violation::DuplicateKey {
                fields: vec!["studentId".to_string(), "courseId".to_string()],
                values: vec!["U2".to_string(), "C1".to_string()],
            }]
        );

        // The fresh pair only trips the dangling course reference.
        let violations =
            check_document(&rules(catalog::ENROLLMENTS), catalog::ENROLLMENTS, &fresh, &store)
                .unwrap();
        assert_eq!(
            violations,
            vec![Violation::DanglingReference {
                field: "courseId".to_string(),
                value: "C2".to_string(),
            }]
        );
    }

    #[test]
    fn test_duplicate_email_detected() {
        let store = seeded_store();
        let user = doc(json!({
            "userId": "U9",
            "email": "maria@example.com",
            "firstName": "Other",
            "lastName": "Maria",
            "role": "student",
            "dateJoined": "2024-01-01T00:00:00Z",
            "isActive": true
        }));

        let violations =
            check_document(&rules(catalog::USERS), catalog::USERS, &user, &store).unwrap();
        assert_eq!(
            violations,
            vec![Violation::DuplicateKey {
                fields: vec!["email".to_string()],
                values: vec!["maria@example.com".to_string()],
            }]
        );
    }

    #[test]
    fn test_reference_role_condition_rejects_instructors_as_students() {
        let store = seeded_store();
        let enrollment = doc(json!({
            "studentId": "U1",
            "courseId": "C1",
            "enrollmentDate": "2024-02-01T00:00:00Z",
            "completed": false
        }));

        let violations =
            check_document(&rules(catalog::ENROLLMENTS), catalog::ENROLLMENTS, &enrollment, &store)
                .unwrap();
        assert_eq!(
            violations,
            vec![Violation::DanglingReference {
                field: "studentId".to_string(),
                value: "U1".to_string(),
            }]
        );
    }

    #[test]
    fn test_price_must_be_non_negative() {
        let store = seeded_store();
        let course = doc(json!({
            "courseId": "C9",
            "title": "Cheap",
            "instructorId": "U1",
            "level": "beginner",
            "duration": 5,
            "price": -1.0,
            "createdAt": "2024-01-10T00:00:00Z",
            "isPublished": false
        }));

        let violations =
            check_document(&rules(catalog::COURSES), catalog::COURSES, &course, &store).unwrap();
        assert_eq!(
            violations,
            vec![Violation::BusinessRule {
                rule: catalog::PRICE_NON_NEGATIVE.to_string(),
                value: "-1.0".to_string(),
            }]
        );
    }

    #[test]
    fn test_grade_bounds() {
        let store = seeded_store();
        let submission = doc(json!({
            "assignmentId": "A1",
            "studentId": "U2",
            "submittedAt": "2024-03-01T00:00:00Z",
            "grade": 150.0
        }));

        let violations =
            check_document(&rules(catalog::SUBMISSIONS), catalog::SUBMISSIONS, &submission, &store)
                .unwrap();
        assert!(violations.contains(&Violation::BusinessRule {
            rule: catalog::GRADE_WITHIN_BOUNDS.to_string(),
            value: "150.0".to_string(),
        }));
    }

    #[test]
    fn test_updated_at_must_not_precede_created_at() {
        let store = seeded_store();
        let course = doc(json!({
            "courseId": "C9",
            "title": "Backwards",
            "instructorId": "U1",
            "level": "beginner",
            "duration": 5,
            "price": 10.0,
            "createdAt": "2024-05-01T00:00:00Z",
            "updatedAt": "2024-04-01T00:00:00Z",
            "isPublished": false
        }));

        let violations =
            check_document(&rules(catalog::COURSES), catalog::COURSES, &course, &store).unwrap();
        assert_eq!(
            violations,
            vec![Violation::BusinessRule {
                rule: catalog::UPDATED_NOT_BEFORE_CREATED.to_string(),
                value: "2024-04-01T00:00:00Z".to_string(),
            }]
        );
    }

    #[test]
    fn test_all_violations_collected_in_one_pass() {
        let store = seeded_store();
        let course = doc(json!({
            "courseId": "C1",
            "title": "Broken",
            "instructorId": "GHOST",
            "level": "beginner",
            "duration": 5,
            "price": -10.0,
            "createdAt": "2024-01-10T00:00:00Z",
            "isPublished": false
        }));

        let violations =
            check_document(&rules(catalog::COURSES), catalog::COURSES, &course, &store).unwrap();
        assert_eq!(
            violations,
            vec![
                Violation::DuplicateKey {
                    fields: vec!["courseId".to_string()],
                    values: vec!["C1".to_string()],
                },
                Violation::DanglingReference {
                    field: "instructorId".to_string(),
                    value: "GHOST".to_string(),
                },
                Violation::BusinessRule {
                    rule: catalog::PRICE_NON_NEGATIVE.to_string(),
                    value: "-10.0".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_absent_optional_fields_skip_rules() {
        let store = seeded_store();
        // No grade, no updatedAt: range rules simply do not apply.
        let submission = doc(json!({
            "assignmentId": "A1",
            "studentId": "U2",
            "submittedAt": "2024-03-01T00:00:00Z"
        }));

        let violations =
            check_document(&rules(catalog::SUBMISSIONS), catalog::SUBMISSIONS, &submission, &store)
                .unwrap();
        // Only the dangling assignment reference remains.
        assert_eq!(
            violations,
            vec![Violation::DanglingReference {
                field: "assignmentId".to_string(),
                value: "A1".to_string(),
            }]
        );
    }
}
