// The education platform's collections, declared in code. Field names are
// the camelCase names the documents carry on the wire.

use super::{
    CollectionSchema, FieldSchema, FieldType, IntegrityRules, Pattern, RangeKind, RangeRule,
    Reference, SchemaRegistry, UniqueKey,
};

pub const USERS: &str = "users";
pub const COURSES: &str = "courses";
pub const ENROLLMENTS: &str = "enrollments";
pub const LESSONS: &str = "lessons";
pub const ASSIGNMENTS: &str = "assignments";
pub const SUBMISSIONS: &str = "submissions";

pub const PRICE_NON_NEGATIVE: &str = "price_non_negative";
pub const GRADE_WITHIN_BOUNDS: &str = "grade_within_bounds";
pub const UPDATED_NOT_BEFORE_CREATED: &str = "updated_not_before_created";

/// Build the registry for all six collections.
pub fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();

    registry.declare(
        CollectionSchema::new(
            USERS,
            vec![
                FieldSchema::required("userId", FieldType::String),
                FieldSchema::required("email", FieldType::String).with_pattern(Pattern::Email),
                FieldSchema::required("firstName", FieldType::String),
                FieldSchema::required("lastName", FieldType::String),
                FieldSchema::required("role", FieldType::String)
                    .with_allowed(&["student", "instructor"]),
                FieldSchema::required("dateJoined", FieldType::Date),
                FieldSchema::required("isActive", FieldType::Boolean),
                FieldSchema::optional("profile", FieldType::Object).with_fields(vec![
                    FieldSchema::optional("bio", FieldType::String),
                    FieldSchema::optional("avatar", FieldType::String),
                    FieldSchema::optional("skills", FieldType::StringArray),
                ]),
            ],
        ),
        IntegrityRules {
            unique_keys: vec![UniqueKey::single("userId"), UniqueKey::single("email")],
            ..Default::default()
        },
    );

    registry.declare(
        CollectionSchema::new(
            COURSES,
            vec![
                FieldSchema::required("courseId", FieldType::String),
                FieldSchema::required("title", FieldType::String),
                FieldSchema::optional("description", FieldType::String),
                FieldSchema::required("instructorId", FieldType::String),
                FieldSchema::optional("category", FieldType::String),
                FieldSchema::required("level", FieldType::String)
                    .with_allowed(&["beginner", "intermediate", "advanced"]),
                FieldSchema::required("duration", FieldType::Integer),
                FieldSchema::required("price", FieldType::Float),
                FieldSchema::optional("tags", FieldType::StringArray),
                FieldSchema::required("createdAt", FieldType::Date),
                FieldSchema::optional("updatedAt", FieldType::Date),
                FieldSchema::required("isPublished", FieldType::Boolean),
                FieldSchema::optional("rating", FieldType::Float),
            ],
        ),
        IntegrityRules {
            unique_keys: vec![UniqueKey::single("courseId")],
            references: vec![
                Reference::new("instructorId", USERS, "userId").requiring("role", "instructor"),
            ],
            range_rules: vec![
                RangeRule::new(PRICE_NON_NEGATIVE, "price", RangeKind::Min(0.0)),
                RangeRule::new(
                    UPDATED_NOT_BEFORE_CREATED,
                    "updatedAt",
                    RangeKind::NotBefore("createdAt".to_string()),
                ),
            ],
        },
    );

    registry.declare(
        CollectionSchema::new(
            ENROLLMENTS,
            vec![
                FieldSchema::required("studentId", FieldType::String),
                FieldSchema::required("courseId", FieldType::String),
                FieldSchema::required("enrollmentDate", FieldType::Date),
                FieldSchema::required("completed", FieldType::Boolean),
            ],
        ),
        IntegrityRules {
            unique_keys: vec![UniqueKey::composite(&["studentId", "courseId"])],
            references: vec![
                // Only student accounts may enroll; instructors taking their
                // own course are rejected here as a dangling reference.
                Reference::new("studentId", USERS, "userId").requiring("role", "student"),
                Reference::new("courseId", COURSES, "courseId"),
            ],
            ..Default::default()
        },
    );

    registry.declare(
        CollectionSchema::new(
            LESSONS,
            vec![
                FieldSchema::required("lessonId", FieldType::String),
                FieldSchema::required("courseId", FieldType::String),
                FieldSchema::required("title", FieldType::String),
                FieldSchema::required("position", FieldType::Integer),
                FieldSchema::optional("content", FieldType::String),
            ],
        ),
        IntegrityRules {
            unique_keys: vec![UniqueKey::single("lessonId")],
            references: vec![Reference::new("courseId", COURSES, "courseId")],
            ..Default::default()
        },
    );

    registry.declare(
        CollectionSchema::new(
            ASSIGNMENTS,
            vec![
                FieldSchema::required("assignmentId", FieldType::String),
                FieldSchema::required("courseId", FieldType::String),
                FieldSchema::required("title", FieldType::String),
                FieldSchema::optional("description", FieldType::String),
                // May be historical; nothing forbids a past due date.
                FieldSchema::required("dueDate", FieldType::Date),
            ],
        ),
        IntegrityRules {
            unique_keys: vec![UniqueKey::single("assignmentId")],
            references: vec![Reference::new("courseId", COURSES, "courseId")],
            ..Default::default()
        },
    );

    registry.declare(
        CollectionSchema::new(
            SUBMISSIONS,
            vec![
                FieldSchema::required("assignmentId", FieldType::String),
                FieldSchema::required("studentId", FieldType::String),
                FieldSchema::optional("content", FieldType::String),
                FieldSchema::required("submittedAt", FieldType::Date),
                FieldSchema::optional("grade", FieldType::Float),
            ],
        ),
        IntegrityRules {
            unique_keys: vec![UniqueKey::composite(&["assignmentId", "studentId"])],
            references: vec![
                Reference::new("assignmentId", ASSIGNMENTS, "assignmentId"),
                Reference::new("studentId", USERS, "userId").requiring("role", "student"),
            ],
            range_rules: vec![RangeRule::new(
                GRADE_WITHIN_BOUNDS,
                "grade",
                RangeKind::Between(0.0, 100.0),
            )],
        },
    );

    registry
}
