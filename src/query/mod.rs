// Typed operations over the document store: guarded inserts, the read set
// the platform serves, and the update/delete paths. Writes return driver
// counts; matching nothing is a result, not an error.

use crate::document::{self, Document};
use crate::error::{EduHubError, Result, StoreError, Violation};
use crate::integrity;
use crate::model::{
    Assignment, Course, Enrollment, Lesson, Profile, Role, Submission, User,
};
use crate::schema::{catalog, SchemaRegistry};
use crate::store::{DeleteResult, DocumentStore, Filter, Update, UpdateResult};
use crate::validation;
use chrono::{DateTime, Utc};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

// ── Guarded inserts ──────────────────────────────────────────────────

/// Admit a document into a collection: structural validation first, then
/// integrity rules, then the store write.
///
/// Violations from either pre-check reject the document before it reaches
/// the store. The store's unique indexes stay authoritative: a duplicate
/// surfacing there (a pre-check race) is reported as the same violation
/// the pre-check would have produced.
pub fn insert_document(
    registry: &SchemaRegistry,
    store: &dyn DocumentStore,
    collection: &str,
    doc: Document,
) -> Result<String> {
    let entry = registry
        .get(collection)
        .ok_or_else(|| EduHubError::Store(StoreError::UnknownCollection(collection.to_string())))?;

    let violations = validation::validate(&entry.schema, &doc);
    if !violations.is_empty() {
        return Err(EduHubError::Rejected(violations));
    }
    let violations = integrity::check_document(&entry.rules, collection, &doc, store)?;
    if !violations.is_empty() {
        return Err(EduHubError::Rejected(violations));
    }

    match store.insert(collection, doc) {
        Ok(id) => Ok(id),
        Err(StoreError::DuplicateKey { fields, values }) => {
            warn!("unique index on '{collection}' caught a duplicate the pre-check missed");
            Err(EduHubError::Rejected(vec![Violation::DuplicateKey {
                fields,
                values,
            }]))
        }
        Err(StoreError::DocumentRejected(violations)) => Err(EduHubError::Rejected(violations)),
        Err(other) => Err(EduHubError::Store(other)),
    }
}

pub fn insert_user(
    registry: &SchemaRegistry,
    store: &dyn DocumentStore,
    user: &User,
) -> Result<String> {
    insert_document(registry, store, catalog::USERS, to_doc(catalog::USERS, user)?)
}

pub fn insert_course(
    registry: &SchemaRegistry,
    store: &dyn DocumentStore,
    course: &Course,
) -> Result<String> {
    insert_document(registry, store, catalog::COURSES, to_doc(catalog::COURSES, course)?)
}

pub fn insert_enrollment(
    registry: &SchemaRegistry,
    store: &dyn DocumentStore,
    enrollment: &Enrollment,
) -> Result<String> {
    insert_document(
        registry,
        store,
        catalog::ENROLLMENTS,
        to_doc(catalog::ENROLLMENTS, enrollment)?,
    )
}

pub fn insert_lesson(
    registry: &SchemaRegistry,
    store: &dyn DocumentStore,
    lesson: &Lesson,
) -> Result<String> {
    insert_document(registry, store, catalog::LESSONS, to_doc(catalog::LESSONS, lesson)?)
}

pub fn insert_assignment(
    registry: &SchemaRegistry,
    store: &dyn DocumentStore,
    assignment: &Assignment,
) -> Result<String> {
    insert_document(
        registry,
        store,
        catalog::ASSIGNMENTS,
        to_doc(catalog::ASSIGNMENTS, assignment)?,
    )
}

pub fn insert_submission(
    registry: &SchemaRegistry,
    store: &dyn DocumentStore,
    submission: &Submission,
) -> Result<String> {
    insert_document(
        registry,
        store,
        catalog::SUBMISSIONS,
        to_doc(catalog::SUBMISSIONS, submission)?,
    )
}

// ── Reads ────────────────────────────────────────────────────────────

/// Users with the given role, optionally restricted to active accounts.
pub fn users_by_role(
    store: &dyn DocumentStore,
    role: Role,
    active_only: bool,
) -> Result<Vec<User>> {
    let mut filter = Filter::all().eq("role", role.as_str());
    if active_only {
        filter = filter.eq("isActive", true);
    }
    collect(store, catalog::USERS, &filter)
}

pub fn courses_by_category(store: &dyn DocumentStore, category: &str) -> Result<Vec<Course>> {
    collect(store, catalog::COURSES, &Filter::all().eq("category", category))
}

/// Case-insensitive substring search over course titles.
pub fn search_courses_by_title(store: &dyn DocumentStore, needle: &str) -> Result<Vec<Course>> {
    collect(store, catalog::COURSES, &Filter::all().contains("title", needle))
}

/// The students enrolled in a course: collect their ids from the
/// enrollments, then fetch the user records. Two reads, no store join.
pub fn students_in_course(store: &dyn DocumentStore, course_id: &str) -> Result<Vec<User>> {
    let enrollments = store.find(
        catalog::ENROLLMENTS,
        &Filter::all().eq("courseId", course_id),
    )?;

    let mut student_ids: Vec<Value> = Vec::new();
    for enrollment in enrollments {
        if let Some(id) = document::get(&enrollment, "studentId") {
            if !student_ids.contains(id) {
                student_ids.push(id.clone());
            }
        }
    }
    if student_ids.is_empty() {
        return Ok(Vec::new());
    }

    collect(store, catalog::USERS, &Filter::all().one_of("userId", student_ids))
}

/// Courses priced within the inclusive range.
pub fn courses_in_price_range(
    store: &dyn DocumentStore,
    min_price: f64,
    max_price: f64,
) -> Result<Vec<Course>> {
    let filter = Filter::all().gte("price", min_price).lte("price", max_price);
    collect(store, catalog::COURSES, &filter)
}

/// Users who joined on or after the cutoff.
pub fn users_joined_since(store: &dyn DocumentStore, cutoff: DateTime<Utc>) -> Result<Vec<User>> {
    let filter = Filter::all().gte("dateJoined", document::format_date(cutoff));
    collect(store, catalog::USERS, &filter)
}

/// Courses carrying at least one of the given tags.
pub fn courses_with_any_tag(store: &dyn DocumentStore, tags: &[&str]) -> Result<Vec<Course>> {
    let values = tags.iter().map(|t| Value::from(*t)).collect();
    collect(store, catalog::COURSES, &Filter::all().one_of("tags", values))
}

/// Assignments due within the inclusive window.
pub fn assignments_due_between(
    store: &dyn DocumentStore,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<Assignment>> {
    let filter = Filter::all()
        .gte("dueDate", document::format_date(from))
        .lte("dueDate", document::format_date(until));
    collect(store, catalog::ASSIGNMENTS, &filter)
}

/// A course together with its instructor's account, when one exists.
pub fn course_with_instructor(
    store: &dyn DocumentStore,
    course_id: &str,
) -> Result<Option<(Course, Option<User>)>> {
    let course = match store.find_one(catalog::COURSES, &Filter::all().eq("courseId", course_id))? {
        Some(doc) => from_doc::<Course>(catalog::COURSES, doc)?,
        None => return Ok(None),
    };

    let instructor = match store.find_one(
        catalog::USERS,
        &Filter::all().eq("userId", course.instructor_id.as_str()),
    )? {
        Some(doc) => Some(from_doc(catalog::USERS, doc)?),
        None => None,
    };

    Ok(Some((course, instructor)))
}

// ── Updates ──────────────────────────────────────────────────────────

/// Replace a user's profile object.
pub fn update_user_profile(
    store: &dyn DocumentStore,
    user_id: &str,
    profile: &Profile,
) -> Result<UpdateResult> {
    let value = serde_json::to_value(profile).map_err(|source| EduHubError::Malformed {
        collection: catalog::USERS.to_string(),
        source,
    })?;
    let update = Update::new().set("profile", value);
    Ok(store.update_one(catalog::USERS, &Filter::all().eq("userId", user_id), &update)?)
}

/// Mark a course published and stamp the update time.
pub fn publish_course(store: &dyn DocumentStore, course_id: &str) -> Result<UpdateResult> {
    let update = Update::new()
        .set("isPublished", true)
        .set("updatedAt", document::format_date(Utc::now()));
    Ok(store.update_one(catalog::COURSES, &Filter::all().eq("courseId", course_id), &update)?)
}

/// Record a grade on a student's submission. Bounds are enforced here with
/// the same rule the insert path applies.
pub fn update_assignment_grade(
    store: &dyn DocumentStore,
    assignment_id: &str,
    student_id: &str,
    grade: f64,
) -> Result<UpdateResult> {
    if !(0.0..=100.0).contains(&grade) {
        return Err(EduHubError::Rejected(vec![Violation::BusinessRule {
            rule: catalog::GRADE_WITHIN_BOUNDS.to_string(),
            value: document::render(&Value::from(grade)),
        }]));
    }
    let filter = Filter::all()
        .eq("assignmentId", assignment_id)
        .eq("studentId", student_id);
    Ok(store.update_one(catalog::SUBMISSIONS, &filter, &Update::new().set("grade", grade))?)
}

/// Add tags to a course, set-style: already-present tags are not repeated.
pub fn add_tags_to_course(
    store: &dyn DocumentStore,
    course_id: &str,
    tags: &[&str],
) -> Result<UpdateResult> {
    let values = tags.iter().map(|t| Value::from(*t)).collect();
    let update = Update::new().add_to_set("tags", values);
    Ok(store.update_one(catalog::COURSES, &Filter::all().eq("courseId", course_id), &update)?)
}

// ── Deletes ──────────────────────────────────────────────────────────

/// Deactivate a user account instead of removing it. Repeating the call is
/// harmless: it matches the account again but modifies nothing.
pub fn deactivate_user(store: &dyn DocumentStore, user_id: &str) -> Result<UpdateResult> {
    let update = Update::new().set("isActive", false);
    Ok(store.update_one(catalog::USERS, &Filter::all().eq("userId", user_id), &update)?)
}

/// Remove a student's enrollment in a course.
pub fn delete_enrollment(
    store: &dyn DocumentStore,
    student_id: &str,
    course_id: &str,
) -> Result<DeleteResult> {
    let filter = Filter::all()
        .eq("studentId", student_id)
        .eq("courseId", course_id);
    Ok(store.delete_one(catalog::ENROLLMENTS, &filter)?)
}

/// Remove a lesson from its course.
pub fn remove_lesson(store: &dyn DocumentStore, lesson_id: &str) -> Result<DeleteResult> {
    Ok(store.delete_one(catalog::LESSONS, &Filter::all().eq("lessonId", lesson_id))?)
}

// ── Conversion helpers ───────────────────────────────────────────────

fn to_doc<T: Serialize>(collection: &str, record: &T) -> Result<Document> {
    document::to_document(record).map_err(|source| EduHubError::Malformed {
        collection: collection.to_string(),
        source,
    })
}

fn from_doc<T: DeserializeOwned>(collection: &str, doc: Document) -> Result<T> {
    document::from_document(doc).map_err(|source| EduHubError::Malformed {
        collection: collection.to_string(),
        source,
    })
}

fn collect<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    filter: &Filter,
) -> Result<Vec<T>> {
    store
        .find(collection, filter)?
        .map(|doc| from_doc(collection, doc))
        .collect()
}
