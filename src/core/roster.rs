//! Grades and sections.
//!
//! Grades are listed by `sort_order`; sections always belong to one grade.

use crate::{
    entities::{Grade, Section, grade, section},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*};

/// Lists all grades in display order.
pub async fn list_grades(db: &DatabaseConnection) -> Result<Vec<grade::Model>> {
    Grade::find()
        .order_by_asc(grade::Column::SortOrder)
        .order_by_asc(grade::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Creates a grade.
pub async fn create_grade(
    db: &DatabaseConnection,
    name: &str,
    sort_order: i32,
) -> Result<grade::Model> {
    let name = non_empty(name, "Grade name")?;
    grade::ActiveModel {
        name: Set(name),
        sort_order: Set(sort_order),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Lists the sections of one grade, alphabetically.
pub async fn sections_for_grade(
    db: &DatabaseConnection,
    grade_id: i64,
) -> Result<Vec<section::Model>> {
    Section::find()
        .filter(section::Column::GradeId.eq(grade_id))
        .order_by_asc(section::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Creates a section inside an existing grade.
pub async fn create_section(
    db: &DatabaseConnection,
    grade_id: i64,
    name: &str,
) -> Result<section::Model> {
    let name = non_empty(name, "Section name")?;
    Grade::find_by_id(grade_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "grade",
            id: grade_id,
        })?;

    section::ActiveModel {
        grade_id: Set(grade_id),
        name: Set(name),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Checks that `section_id`, when given, belongs to `grade_id`.
pub async fn ensure_section_in_grade<C>(
    db: &C,
    grade_id: i64,
    section_id: Option<i64>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    Grade::find_by_id(grade_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "grade",
            id: grade_id,
        })?;

    let Some(section_id) = section_id else {
        return Ok(());
    };
    let section = Section::find_by_id(section_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "section",
            id: section_id,
        })?;
    if section.grade_id != grade_id {
        return Err(Error::InvalidInput {
            message: format!("Section {section_id} does not belong to grade {grade_id}"),
        });
    }
    Ok(())
}

fn non_empty(value: &str, what: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput {
            message: format!("{what} cannot be empty"),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_grade_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let result = create_grade(&db, "  ", 1).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_grades_in_sort_order() -> Result<()> {
        let db = setup_test_db().await?;
        create_grade(&db, "6to Grado", 6).await?;
        create_grade(&db, "1er Grado", 1).await?;
        create_grade(&db, "3er Grado", 3).await?;

        let names: Vec<String> = list_grades(&db)
            .await?
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, ["1er Grado", "3er Grado", "6to Grado"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_sections_belong_to_grade() -> Result<()> {
        let db = setup_test_db().await?;
        let fifth = create_grade(&db, "5to Grado", 5).await?;
        let sixth = create_grade(&db, "6to Grado", 6).await?;
        let b = create_section(&db, fifth.id, "B").await?;
        let a = create_section(&db, fifth.id, "A").await?;
        create_section(&db, sixth.id, "A").await?;

        let sections = sections_for_grade(&db, fifth.id).await?;
        assert_eq!(sections, vec![a.clone(), b]);

        ensure_section_in_grade(&db, fifth.id, Some(a.id)).await?;
        ensure_section_in_grade(&db, sixth.id, None).await?;
        assert!(matches!(
            ensure_section_in_grade(&db, sixth.id, Some(a.id)).await,
            Err(Error::InvalidInput { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_section_unknown_grade() -> Result<()> {
        let db = setup_test_db().await?;
        let result = create_section(&db, 99, "A").await;
        assert!(matches!(result, Err(Error::NotFound { entity: "grade", .. })));
        Ok(())
    }
}
