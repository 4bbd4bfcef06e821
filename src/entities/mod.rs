//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod charge;
pub mod enrollment;
pub mod enums;
pub mod grade;
pub mod guardian;
pub mod payment;
pub mod school_settings;
pub mod section;
pub mod student;

// Re-export specific types to avoid conflicts
pub use charge::{Column as ChargeColumn, Entity as Charge, Model as ChargeModel};
pub use enrollment::{Column as EnrollmentColumn, Entity as Enrollment, Model as EnrollmentModel};
pub use enums::{
    ChargeStatus, Concept, Currency, EnrollmentStatus, PaymentMethod, StudentStatus,
};
pub use grade::{Column as GradeColumn, Entity as Grade, Model as GradeModel};
pub use guardian::{Column as GuardianColumn, Entity as Guardian, Model as GuardianModel};
pub use payment::{Column as PaymentColumn, Entity as Payment, Model as PaymentModel};
pub use school_settings::{
    Column as SchoolSettingsColumn, Entity as SchoolSettings, Model as SchoolSettingsModel,
};
pub use section::{Column as SectionColumn, Entity as Section, Model as SectionModel};
pub use student::{Column as StudentColumn, Entity as Student, Model as StudentModel};
