//! Student registry - Handles students and their guardians.
//!
//! Registering a student creates its guardian in the same store transaction, so a
//! failed registration never leaves an orphan guardian behind. Listings join the
//! guardian, grade and section names so callers can search and export them.

use crate::{
    core::{
        events::{ChangeEvent, ChangeFeed, EntityKind},
        roster::ensure_section_in_grade,
    },
    entities::{
        Charge, Enrollment, Grade, Guardian, Payment, Section, Student, StudentStatus, charge,
        enrollment, guardian, payment, student,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, instrument};

/// Guardian details captured on the registration form.
#[derive(Debug, Clone)]
pub struct GuardianInput {
    /// Full name
    pub full_name: String,
    /// Contact phone
    pub phone: String,
}

/// Everything needed to register a student.
#[derive(Debug, Clone)]
pub struct NewStudent {
    /// Full name
    pub full_name: String,
    /// Optional school-issued code
    pub enrollment_code: Option<String>,
    /// Guardian to create alongside the student
    pub guardian: GuardianInput,
    /// Grade the student joins
    pub grade_id: i64,
    /// Section within the grade, if any
    pub section_id: Option<i64>,
}

/// Profile edit for an existing student and its guardian.
#[derive(Debug, Clone)]
pub struct StudentUpdate {
    /// Full name
    pub full_name: String,
    /// Grade
    pub grade_id: i64,
    /// Section within the grade, if any
    pub section_id: Option<i64>,
    /// Guardian details
    pub guardian: GuardianInput,
}

/// Filters for [`list_students`]. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    /// Case-insensitive text matched against name, grade, section, guardian and phone
    pub search: Option<String>,
    /// Only this grade
    pub grade_id: Option<i64>,
    /// Only this section
    pub section_id: Option<i64>,
    /// Only this status
    pub status: Option<StudentStatus>,
}

/// A student joined with display names, as shown in listings and exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentRow {
    /// Student id
    pub id: i64,
    /// Full name
    pub full_name: String,
    /// School-issued code
    pub enrollment_code: Option<String>,
    /// Active or inactive
    pub status: StudentStatus,
    /// Grade id
    pub grade_id: i64,
    /// Grade name, `-` when unknown
    pub grade: String,
    /// Section id
    pub section_id: Option<i64>,
    /// Section name, `-` when none
    pub section: String,
    /// Guardian id
    pub guardian_id: i64,
    /// Guardian name
    pub guardian: String,
    /// Guardian phone
    pub phone: String,
}

impl StudentRow {
    fn matches(&self, needle: &str) -> bool {
        format!(
            "{} {} {} {} {}",
            self.full_name, self.grade, self.section, self.guardian, self.phone
        )
        .to_lowercase()
        .contains(needle)
    }
}

/// Registers a student together with a new guardian.
#[instrument(skip(db, feed, new_student), fields(name = %new_student.full_name))]
pub async fn register_student(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    new_student: NewStudent,
) -> Result<student::Model> {
    let full_name = required(&new_student.full_name, "Student name")?;
    let guardian_name = required(&new_student.guardian.full_name, "Guardian name")?;
    let enrollment_code = new_student
        .enrollment_code
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty());

    let txn = db.begin().await?;
    ensure_section_in_grade(&txn, new_student.grade_id, new_student.section_id).await?;

    let guardian = guardian::ActiveModel {
        full_name: Set(guardian_name),
        phone: Set(new_student.guardian.phone.trim().to_string()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let student = student::ActiveModel {
        full_name: Set(full_name),
        enrollment_code: Set(enrollment_code),
        status: Set(StudentStatus::Activo),
        guardian_id: Set(guardian.id),
        grade_id: Set(new_student.grade_id),
        section_id: Set(new_student.section_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(student_id = student.id, "Student registered");
    feed.publish_all([
        ChangeEvent::inserted(EntityKind::Guardian, guardian.id),
        ChangeEvent::inserted(EntityKind::Student, student.id),
    ]);
    Ok(student)
}

/// Registers a sibling: a student sharing an existing guardian.
pub async fn register_sibling(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    guardian_id: i64,
    full_name: &str,
    grade_id: i64,
    section_id: Option<i64>,
) -> Result<student::Model> {
    let full_name = required(full_name, "Student name")?;
    Guardian::find_by_id(guardian_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "guardian",
            id: guardian_id,
        })?;
    ensure_section_in_grade(db, grade_id, section_id).await?;

    let student = student::ActiveModel {
        full_name: Set(full_name),
        enrollment_code: Set(None),
        status: Set(StudentStatus::Activo),
        guardian_id: Set(guardian_id),
        grade_id: Set(grade_id),
        section_id: Set(section_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    feed.publish(ChangeEvent::inserted(EntityKind::Student, student.id));
    Ok(student)
}

/// Finds a student by id.
pub async fn get_student<C>(db: &C, student_id: i64) -> Result<Option<student::Model>>
where
    C: ConnectionTrait,
{
    Student::find_by_id(student_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a student by id, failing when it does not exist.
pub async fn require_student<C>(db: &C, student_id: i64) -> Result<student::Model>
where
    C: ConnectionTrait,
{
    get_student(db, student_id).await?.ok_or(Error::NotFound {
        entity: "student",
        id: student_id,
    })
}

/// Updates a student's profile and its guardian's contact details.
pub async fn update_student(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    student_id: i64,
    update: StudentUpdate,
) -> Result<student::Model> {
    let full_name = required(&update.full_name, "Student name")?;
    let guardian_name = required(&update.guardian.full_name, "Guardian name")?;

    let txn = db.begin().await?;
    let existing = require_student(&txn, student_id).await?;
    ensure_section_in_grade(&txn, update.grade_id, update.section_id).await?;

    let guardian_id = existing.guardian_id;
    let mut student_model: student::ActiveModel = existing.into();
    student_model.full_name = Set(full_name);
    student_model.grade_id = Set(update.grade_id);
    student_model.section_id = Set(update.section_id);
    let updated = student_model.update(&txn).await?;

    Guardian::update_many()
        .col_expr(guardian::Column::FullName, Expr::value(guardian_name))
        .col_expr(
            guardian::Column::Phone,
            Expr::value(update.guardian.phone.trim().to_string()),
        )
        .filter(guardian::Column::Id.eq(guardian_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;
    feed.publish_all([
        ChangeEvent::updated(EntityKind::Student, student_id),
        ChangeEvent::updated(EntityKind::Guardian, guardian_id),
    ]);
    Ok(updated)
}

/// Marks a student active or inactive. Inactive students keep their history.
pub async fn set_student_status(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    student_id: i64,
    status: StudentStatus,
) -> Result<student::Model> {
    let existing = require_student(db, student_id).await?;
    let mut student_model: student::ActiveModel = existing.into();
    student_model.status = Set(status);
    let updated = student_model.update(db).await?;
    feed.publish(ChangeEvent::updated(EntityKind::Student, student_id));
    Ok(updated)
}

/// Permanently deletes a student that has no payments and no charges on record.
///
/// Payments and charges are never deleted, so a student with either must be set
/// inactive instead. An enrollment nothing was billed against is removed with
/// the student.
#[instrument(skip(db, feed))]
pub async fn delete_student(
    db: &DatabaseConnection,
    feed: &ChangeFeed,
    student_id: i64,
) -> Result<()> {
    let txn = db.begin().await?;
    require_student(&txn, student_id).await?;

    let payments = Payment::find()
        .filter(payment::Column::StudentId.eq(student_id))
        .count(&txn)
        .await?;
    if payments > 0 {
        return Err(Error::InvalidInput {
            message: format!(
                "Student {student_id} has {payments} payments on record; deactivate instead"
            ),
        });
    }

    let charges = Charge::find()
        .filter(charge::Column::StudentId.eq(student_id))
        .count(&txn)
        .await?;
    if charges > 0 {
        return Err(Error::InvalidInput {
            message: format!(
                "Student {student_id} has {charges} charges on record; deactivate instead"
            ),
        });
    }

    Enrollment::delete_many()
        .filter(enrollment::Column::StudentId.eq(student_id))
        .exec(&txn)
        .await?;
    Student::delete_by_id(student_id).exec(&txn).await?;
    txn.commit().await?;

    info!("Student deleted");
    feed.publish(ChangeEvent::deleted(EntityKind::Student, student_id));
    Ok(())
}

/// Lists students newest first, joined with guardian, grade and section names.
pub async fn list_students(
    db: &DatabaseConnection,
    filter: &StudentFilter,
) -> Result<Vec<StudentRow>> {
    let mut query = Student::find().order_by_desc(student::Column::CreatedAt);
    if let Some(grade_id) = filter.grade_id {
        query = query.filter(student::Column::GradeId.eq(grade_id));
    }
    if let Some(section_id) = filter.section_id {
        query = query.filter(student::Column::SectionId.eq(section_id));
    }
    if let Some(status) = filter.status {
        query = query.filter(student::Column::Status.eq(status));
    }
    let students = query
        .order_by_desc(student::Column::Id)
        .all(db)
        .await?;

    let mut rows = to_rows(db, students).await?;
    if let Some(needle) = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let needle = needle.to_lowercase();
        rows.retain(|row| row.matches(&needle));
    }
    Ok(rows)
}

/// Joins display names onto student models.
pub async fn to_rows<C>(db: &C, students: Vec<student::Model>) -> Result<Vec<StudentRow>>
where
    C: ConnectionTrait,
{
    let guardians: HashMap<i64, guardian::Model> = Guardian::find()
        .all(db)
        .await?
        .into_iter()
        .map(|g| (g.id, g))
        .collect();
    let grades: HashMap<i64, String> = Grade::find()
        .all(db)
        .await?
        .into_iter()
        .map(|g| (g.id, g.name))
        .collect();
    let sections: HashMap<i64, String> = Section::find()
        .all(db)
        .await?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();

    Ok(students
        .into_iter()
        .map(|s| {
            let guardian = guardians.get(&s.guardian_id);
            StudentRow {
                id: s.id,
                full_name: s.full_name,
                enrollment_code: s.enrollment_code,
                status: s.status,
                grade_id: s.grade_id,
                grade: grades
                    .get(&s.grade_id)
                    .cloned()
                    .unwrap_or_else(|| "-".to_string()),
                section_id: s.section_id,
                section: s
                    .section_id
                    .and_then(|id| sections.get(&id).cloned())
                    .unwrap_or_else(|| "-".to_string()),
                guardian_id: s.guardian_id,
                guardian: guardian.map_or_else(|| "-".to_string(), |g| g.full_name.clone()),
                phone: guardian.map_or_else(|| "-".to_string(), |g| g.phone.clone()),
            }
        })
        .collect())
}

fn required(value: &str, what: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput {
            message: format!("{what} cannot be empty"),
        });
    }
    Ok(trimmed.to_string())
}
