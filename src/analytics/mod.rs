// Reporting queries built on the aggregation pipeline. Each operation
// assembles its stages, runs them through the store and deserializes the
// rows into a typed shape.

use crate::document;
use crate::error::{EduHubError, Result};
use crate::pipeline::{Accumulator, Expr, Stage};
use crate::schema::catalog;
use crate::store::DocumentStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// How many students `top_performing_students` reports by default.
pub const DEFAULT_TOP_STUDENTS: usize = 5;

/// How many categories `popular_categories` reports.
pub const POPULAR_CATEGORY_LIMIT: usize = 5;

// ── Result rows ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseEnrollments {
    #[serde(rename = "courseId")]
    pub course_id: String,
    pub total_enrollments: u64,
}

/// Average rating reported as null when no document carried one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRating {
    #[serde(rename = "courseId")]
    pub course_id: String,
    pub avg_rating: Option<f64>,
}

/// Categories group under null when a course declares none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: Option<String>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAverage {
    #[serde(rename = "studentId")]
    pub student_id: String,
    pub avg_grade: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentScore {
    #[serde(rename = "studentId")]
    pub student_id: String,
    pub avg_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseCompletion {
    #[serde(rename = "courseId")]
    pub course_id: String,
    #[serde(default)]
    pub completion_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorStudents {
    #[serde(rename = "instructorId")]
    pub instructor_id: String,
    pub total_students: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorRating {
    #[serde(rename = "instructorId")]
    pub instructor_id: String,
    pub avg_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorRevenue {
    #[serde(rename = "instructorId")]
    pub instructor_id: String,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyEnrollments {
    pub month: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentEngagement {
    #[serde(rename = "studentId")]
    pub student_id: String,
    pub submissions: u64,
    pub avg_grade: Option<f64>,
}

// ── Operations ───────────────────────────────────────────────────────

/// Enrollment counts per course, busiest first.
pub fn enrollments_per_course(store: &dyn DocumentStore) -> Result<Vec<CourseEnrollments>> {
    let stages = [
        group("courseId", vec![("total_enrollments", Accumulator::Count)]),
        sort_desc("total_enrollments"),
    ];
    rows(store, catalog::ENROLLMENTS, &stages)
}

/// Rating per course; unrated courses report null.
pub fn average_course_rating(store: &dyn DocumentStore) -> Result<Vec<CourseRating>> {
    let stages = [group(
        "courseId",
        vec![("avg_rating", Accumulator::Avg(Expr::field("rating")))],
    )];
    rows(store, catalog::COURSES, &stages)
}

/// Course counts per category, largest first.
pub fn courses_per_category(store: &dyn DocumentStore) -> Result<Vec<CategoryTotal>> {
    let stages = [
        group("category", vec![("total", Accumulator::Count)]),
        sort_desc("total"),
    ];
    rows(store, catalog::COURSES, &stages)
}

/// Mean grade per student across all submissions, best first.
pub fn average_grade_per_student(store: &dyn DocumentStore) -> Result<Vec<StudentAverage>> {
    let stages = [
        group(
            "studentId",
            vec![("avg_grade", Accumulator::Avg(Expr::field("grade")))],
        ),
        sort_desc("avg_grade"),
    ];
    rows(store, catalog::SUBMISSIONS, &stages)
}

/// Share of enrollments marked completed per course, highest first.
pub fn completion_rate_by_course(store: &dyn DocumentStore) -> Result<Vec<CourseCompletion>> {
    let stages = [
        group(
            "courseId",
            vec![
                ("total_students", Accumulator::Count),
                ("completed", Accumulator::CountIf("completed".to_string())),
            ],
        ),
        project(vec![
            ("courseId", Expr::field("courseId")),
            (
                "completion_rate",
                Expr::div(Expr::field("completed"), Expr::field("total_students")),
            ),
        ]),
        sort_desc("completion_rate"),
    ];
    rows(store, catalog::ENROLLMENTS, &stages)
}

/// The `limit` students with the best mean grade. Ties keep the order the
/// grouping encountered them in.
pub fn top_performing_students(
    store: &dyn DocumentStore,
    limit: usize,
) -> Result<Vec<StudentScore>> {
    let stages = [
        group(
            "studentId",
            vec![("avg_score", Accumulator::Avg(Expr::field("grade")))],
        ),
        sort_desc("avg_score"),
        Stage::Limit(limit),
    ];
    rows(store, catalog::SUBMISSIONS, &stages)
}

/// Enrollment headcount per instructor, summed across their courses.
pub fn students_per_instructor(store: &dyn DocumentStore) -> Result<Vec<InstructorStudents>> {
    let stages = [
        lookup(catalog::ENROLLMENTS, "courseId", "enrollments"),
        group(
            "instructorId",
            vec![("total_students", Accumulator::Sum(Expr::size_of("enrollments")))],
        ),
    ];
    rows(store, catalog::COURSES, &stages)
}

/// Mean course rating per instructor; null when none of their courses is
/// rated.
pub fn average_rating_per_instructor(store: &dyn DocumentStore) -> Result<Vec<InstructorRating>> {
    let stages = [group(
        "instructorId",
        vec![("avg_rating", Accumulator::Avg(Expr::field("rating")))],
    )];
    rows(store, catalog::COURSES, &stages)
}

/// Revenue per instructor: price times enrollment count, summed over their
/// courses.
pub fn revenue_per_instructor(store: &dyn DocumentStore) -> Result<Vec<InstructorRevenue>> {
    let stages = [
        lookup(catalog::ENROLLMENTS, "courseId", "enrollments"),
        project(vec![
            ("instructorId", Expr::field("instructorId")),
            (
                "revenue",
                Expr::mul(Expr::field("price"), Expr::size_of("enrollments")),
            ),
        ]),
        group(
            "instructorId",
            vec![("total_revenue", Accumulator::Sum(Expr::field("revenue")))],
        ),
    ];
    rows(store, catalog::COURSES, &stages)
}

/// Enrollments bucketed by calendar month, oldest first.
pub fn monthly_enrollment_trend(store: &dyn DocumentStore) -> Result<Vec<MonthlyEnrollments>> {
    let stages = [
        project(vec![("month", Expr::Month("enrollmentDate".to_string()))]),
        group("month", vec![("count", Accumulator::Count)]),
        sort_asc("month"),
    ];
    rows(store, catalog::ENROLLMENTS, &stages)
}

/// The most populated course categories.
pub fn popular_categories(store: &dyn DocumentStore) -> Result<Vec<CategoryCount>> {
    let stages = [
        group("category", vec![("count", Accumulator::Count)]),
        sort_desc("count"),
        Stage::Limit(POPULAR_CATEGORY_LIMIT),
    ];
    rows(store, catalog::COURSES, &stages)
}

/// Submission volume and mean grade per student, most active first.
pub fn student_engagement(store: &dyn DocumentStore) -> Result<Vec<StudentEngagement>> {
    let stages = [
        group(
            "studentId",
            vec![
                ("submissions", Accumulator::Count),
                ("avg_grade", Accumulator::Avg(Expr::field("grade"))),
            ],
        ),
        sort_desc("submissions"),
    ];
    rows(store, catalog::SUBMISSIONS, &stages)
}

// ── Stage shorthands ─────────────────────────────────────────────────

fn group(by: &str, fields: Vec<(&str, Accumulator)>) -> Stage {
    Stage::Group {
        by: by.to_string(),
        fields: fields
            .into_iter()
            .map(|(name, acc)| (name.to_string(), acc))
            .collect(),
    }
}

fn project(fields: Vec<(&str, Expr)>) -> Stage {
    Stage::Project(
        fields
            .into_iter()
            .map(|(name, expr)| (name.to_string(), expr))
            .collect(),
    )
}

fn lookup(from: &str, on: &str, as_field: &str) -> Stage {
    Stage::Lookup {
        from: from.to_string(),
        local_field: on.to_string(),
        foreign_field: on.to_string(),
        as_field: as_field.to_string(),
    }
}

fn sort_desc(field: &str) -> Stage {
    Stage::Sort {
        field: field.to_string(),
        descending: true,
    }
}

fn sort_asc(field: &str) -> Stage {
    Stage::Sort {
        field: field.to_string(),
        descending: false,
    }
}

fn rows<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    stages: &[Stage],
) -> Result<Vec<T>> {
    store
        .aggregate(collection, stages)?
        .map(|row| {
            document::from_document(row).map_err(|source| EduHubError::Malformed {
                collection: collection.to_string(),
                source,
            })
        })
        .collect()
}
