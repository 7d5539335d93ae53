//! Sheet row -> record mapping, keyed by normalised header aliases

use chrono::NaiveDate;
use derive_more::Display;

use crate::excel::reader::SheetRow;
use crate::model::employee::RecordStatus;

pub const EMP_ID: &[&str] = &["emp_id", "employee_id", "emp_code", "employee_code", "emp_no", "id_no"];
pub const NAME: &[&str] = &["name", "employee_name", "full_name", "worker_name", "labour_name"];
pub const FATHER_NAME: &[&str] = &["father_name", "father_s_name", "fathers_name"];
pub const DESIGNATION: &[&str] = &["designation", "position", "job_title", "trade"];
pub const DEPARTMENT: &[&str] = &["department", "dept"];
pub const PROJECT: &[&str] = &["project", "project_name", "site_project"];
pub const SITE: &[&str] = &["site", "site_name", "location"];
pub const PHONE: &[&str] = &["phone", "mobile", "mobile_no", "phone_no", "contact_no"];
pub const EMAIL: &[&str] = &["email", "email_address", "e_mail"];
pub const JOINING_DATE: &[&str] = &["joining_date", "doj", "date_of_joining", "join_date"];
pub const STATUS: &[&str] = &["status", "employee_status"];
pub const COMPANY: &[&str] = &["company_name", "company", "supplier", "vendor", "subcontractor_name"];
pub const CONTACT_PERSON: &[&str] = &["contact_person", "contact_name", "representative"];
pub const WORK_TYPE: &[&str] = &["work_type", "scope_of_work", "scope", "trade"];
pub const LABOUR_COUNT: &[&str] = &["labour_count", "manpower", "headcount", "no_of_labour"];

#[derive(Debug, Display, PartialEq)]
pub enum MappingError {
    #[display(fmt = "missing required field '{}'", _0)]
    Missing(&'static str),
    #[display(fmt = "invalid {} '{}'", field, value)]
    Invalid { field: &'static str, value: String },
    #[display(fmt = "{} is longer than {} characters", field, max)]
    TooLong { field: &'static str, max: usize },
}

/// Column widths from the record tables, in characters.
const CODE_LEN: usize = 64;
const TEXT_LEN: usize = 255;

fn fits(value: &str, field: &'static str, max: usize) -> Result<String, MappingError> {
    if value.chars().count() > max {
        return Err(MappingError::TooLong { field, max });
    }
    Ok(value.to_string())
}

fn required(
    row: &SheetRow,
    aliases: &[&str],
    field: &'static str,
    max: usize,
) -> Result<String, MappingError> {
    let value = row.get(aliases).ok_or(MappingError::Missing(field))?;
    fits(value, field, max)
}

fn optional(
    row: &SheetRow,
    aliases: &[&str],
    field: &'static str,
    max: usize,
) -> Result<Option<String>, MappingError> {
    row.get(aliases).map(|value| fits(value, field, max)).transpose()
}

fn optional_date(row: &SheetRow, field: &'static str) -> Result<Option<NaiveDate>, MappingError> {
    match row.get(JOINING_DATE) {
        None => Ok(None),
        Some(raw) => parse_date(raw).map(Some).ok_or_else(|| MappingError::Invalid {
            field,
            value: raw.to_string(),
        }),
    }
}

fn optional_status(row: &SheetRow) -> Result<Option<RecordStatus>, MappingError> {
    match row.get(STATUS) {
        None => Ok(None),
        Some(raw) => parse_status(raw).map(Some).ok_or_else(|| MappingError::Invalid {
            field: "status",
            value: raw.to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeRecord {
    pub emp_id: String,
    pub name: String,
    pub father_name: Option<String>,
    pub designation: Option<String>,
    pub department: Option<String>,
    pub project_name: Option<String>,
    pub site: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub joining_date: Option<NaiveDate>,
    /// `None` keeps the stored status on update and means active on insert
    pub status: Option<RecordStatus>,
}

impl EmployeeRecord {
    pub fn from_row(row: &SheetRow) -> Result<Self, MappingError> {
        Ok(Self {
            emp_id: required(row, EMP_ID, "emp_id", CODE_LEN)?,
            name: required(row, NAME, "name", TEXT_LEN)?,
            father_name: optional(row, FATHER_NAME, "father_name", TEXT_LEN)?,
            designation: optional(row, DESIGNATION, "designation", TEXT_LEN)?,
            department: optional(row, DEPARTMENT, "department", TEXT_LEN)?,
            project_name: optional(row, PROJECT, "project_name", TEXT_LEN)?,
            site: optional(row, SITE, "site", TEXT_LEN)?,
            phone: optional(row, PHONE, "phone", CODE_LEN)?,
            email: optional(row, EMAIL, "email", TEXT_LEN)?,
            joining_date: optional_date(row, "joining_date")?,
            status: optional_status(row)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupplyLabourRecord {
    pub emp_id: String,
    pub name: String,
    pub company_name: String,
    pub designation: Option<String>,
    pub project_name: Option<String>,
    pub phone: Option<String>,
    pub joining_date: Option<NaiveDate>,
    pub status: Option<RecordStatus>,
}

impl SupplyLabourRecord {
    pub fn from_row(row: &SheetRow) -> Result<Self, MappingError> {
        Ok(Self {
            emp_id: required(row, EMP_ID, "emp_id", CODE_LEN)?,
            name: required(row, NAME, "name", TEXT_LEN)?,
            company_name: required(row, COMPANY, "company_name", TEXT_LEN)?,
            designation: optional(row, DESIGNATION, "designation", TEXT_LEN)?,
            project_name: optional(row, PROJECT, "project_name", TEXT_LEN)?,
            phone: optional(row, PHONE, "phone", CODE_LEN)?,
            joining_date: optional_date(row, "joining_date")?,
            status: optional_status(row)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubcontractorRecord {
    pub company_name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub project_name: Option<String>,
    pub work_type: Option<String>,
    pub labour_count: Option<i32>,
    pub status: Option<RecordStatus>,
}

impl SubcontractorRecord {
    pub fn from_row(row: &SheetRow) -> Result<Self, MappingError> {
        let labour_count = match row.get(LABOUR_COUNT) {
            None => None,
            Some(raw) => Some(parse_count(raw).ok_or_else(|| MappingError::Invalid {
                field: "labour_count",
                value: raw.to_string(),
            })?),
        };

        Ok(Self {
            company_name: required(row, COMPANY, "company_name", TEXT_LEN)?,
            contact_person: optional(row, CONTACT_PERSON, "contact_person", TEXT_LEN)?,
            phone: optional(row, PHONE, "phone", CODE_LEN)?,
            email: optional(row, EMAIL, "email", TEXT_LEN)?,
            project_name: optional(row, PROJECT, "project_name", TEXT_LEN)?,
            work_type: optional(row, WORK_TYPE, "work_type", TEXT_LEN)?,
            labour_count,
            status: optional_status(row)?,
        })
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%Y/%m/%d"];

/// Accepts ISO dates, day-first dates and the `YYYY-MM-DD HH:MM:SS` rendering of date cells.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.split_whitespace().next().unwrap_or(raw);

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

pub fn parse_status(raw: &str) -> Option<RecordStatus> {
    match raw.trim().to_lowercase().as_str() {
        "active" | "working" | "yes" | "y" | "1" | "true" => Some(RecordStatus::Active),
        "inactive" | "left" | "resigned" | "terminated" | "no" | "n" | "0" | "false" => {
            Some(RecordStatus::Inactive)
        }
        _ => None,
    }
}

fn parse_count(raw: &str) -> Option<i32> {
    let value: f64 = raw.trim().parse().ok()?;
    (value >= 0.0 && value.fract() == 0.0 && value <= i32::MAX as f64).then_some(value as i32)
}

/// `"Site Survey (Phase 2)"` -> `"site-survey-phase-2"`
pub fn slugify(raw: &str) -> String {
    raw.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> SheetRow {
        SheetRow {
            index: 0,
            cells: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn employee_from_aliased_columns() {
        let record = EmployeeRecord::from_row(&row(&[
            ("employee_code", "EMP-7"),
            ("full_name", "Asha Roy"),
            ("project_name", "Tower A"),
            ("doj", "15/03/2023"),
            ("status", "Left"),
        ]))
        .unwrap();

        assert_eq!(record.emp_id, "EMP-7");
        assert_eq!(record.name, "Asha Roy");
        assert_eq!(record.project_name.as_deref(), Some("Tower A"));
        assert_eq!(record.joining_date, NaiveDate::from_ymd_opt(2023, 3, 15));
        assert_eq!(record.status, Some(RecordStatus::Inactive));
        assert_eq!(record.email, None);
    }

    #[test]
    fn missing_required_field_is_named() {
        let err = EmployeeRecord::from_row(&row(&[("name", "No Code")])).unwrap_err();
        assert_eq!(err, MappingError::Missing("emp_id"));
        assert_eq!(err.to_string(), "missing required field 'emp_id'");
    }

    #[test]
    fn unknown_status_rejects_row() {
        let err = EmployeeRecord::from_row(&row(&[("emp_id", "1"), ("name", "A"), ("status", "on leave")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid status 'on leave'");
    }

    #[test]
    fn supply_labour_needs_company() {
        let err = SupplyLabourRecord::from_row(&row(&[("emp_id", "S1"), ("name", "B")])).unwrap_err();
        assert_eq!(err, MappingError::Missing("company_name"));

        let ok = SupplyLabourRecord::from_row(&row(&[("emp_id", "S1"), ("name", "B"), ("vendor", "Acme")])).unwrap();
        assert_eq!(ok.company_name, "Acme");
        assert_eq!(ok.status, None);
    }

    #[test]
    fn subcontractor_labour_count() {
        let record =
            SubcontractorRecord::from_row(&row(&[("company", "Acme Civil"), ("manpower", "35")])).unwrap();
        assert_eq!(record.labour_count, Some(35));

        let err = SubcontractorRecord::from_row(&row(&[("company", "Acme"), ("manpower", "-2")])).unwrap_err();
        assert!(matches!(err, MappingError::Invalid { field: "labour_count", .. }));
    }

    #[test]
    fn values_wider_than_their_column_reject_the_row() {
        let long_code = "E".repeat(65);
        let err = EmployeeRecord::from_row(&row(&[("emp_id", long_code.as_str()), ("name", "A")])).unwrap_err();
        assert_eq!(err, MappingError::TooLong { field: "emp_id", max: 64 });
        assert_eq!(err.to_string(), "emp_id is longer than 64 characters");

        let long_phone = "9".repeat(65);
        let err = SupplyLabourRecord::from_row(&row(&[
            ("emp_id", "S1"),
            ("name", "B"),
            ("vendor", "Acme"),
            ("mobile", long_phone.as_str()),
        ]))
        .unwrap_err();
        assert_eq!(err, MappingError::TooLong { field: "phone", max: 64 });

        let long_scope = "x".repeat(256);
        let err = SubcontractorRecord::from_row(&row(&[("company", "Acme"), ("scope", long_scope.as_str())])).unwrap_err();
        assert_eq!(err, MappingError::TooLong { field: "work_type", max: 255 });
    }

    #[test]
    fn width_counts_characters_not_bytes() {
        let name = "é".repeat(255);
        let record = EmployeeRecord::from_row(&row(&[("emp_id", "E-1"), ("name", name.as_str())])).unwrap();
        assert_eq!(record.name.chars().count(), 255);
    }

    #[test]
    fn date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 5);
        assert_eq!(parse_date("2024-02-05"), expected);
        assert_eq!(parse_date("05-02-2024"), expected);
        assert_eq!(parse_date("05/02/2024"), expected);
        assert_eq!(parse_date("05.02.2024"), expected);
        assert_eq!(parse_date("2024-02-05 00:00:00"), expected);
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date("tomorrow"), None);
    }

    #[test]
    fn status_words() {
        assert_eq!(parse_status(" Working "), Some(RecordStatus::Active));
        assert_eq!(parse_status("resigned"), Some(RecordStatus::Inactive));
        assert_eq!(parse_status("maybe"), None);
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("Site Survey (Phase 2)"), "site-survey-phase-2");
        assert_eq!(slugify("  --  "), "");
        assert_eq!(slugify("Tower_A"), "tower-a");
    }
}
