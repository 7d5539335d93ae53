//! Master report workbook

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet};
use serde::Serialize;
use utoipa::ToSchema;

use crate::ingest::mapping::slugify;
use crate::model::employee::Employee;
use crate::model::subcontractor::Subcontractor;
use crate::model::supply_labour::SupplyLabour;

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const UNASSIGNED_PROJECT: &str = "(unassigned)";

/// One claimed template row, joined with the employee who claimed it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PickReportRow {
    pub format_id: String,
    pub format_name: String,
    pub row_index: i32,
    pub emp_id: String,
    pub employee_name: String,
    pub project_name: Option<String>,
    pub picked_at: DateTime<Utc>,
}

/// Everything the master workbook is built from.
#[derive(Debug, Clone)]
pub struct MasterReport {
    pub generated_at: DateTime<Utc>,
    pub project: Option<String>,
    pub employees: Vec<Employee>,
    pub supply_labour: Vec<SupplyLabour>,
    pub subcontractors: Vec<Subcontractor>,
    pub picks: Vec<PickReportRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProjectHeadcount {
    pub project: String,
    pub employees_active: u64,
    pub employees_inactive: u64,
    pub supply_labour: u64,
}

enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl From<&Option<String>> for Cell {
    fn from(v: &Option<String>) -> Self {
        match v {
            Some(s) => Cell::Text(s.clone()),
            None => Cell::Empty,
        }
    }
}

impl From<Option<NaiveDate>> for Cell {
    fn from(v: Option<NaiveDate>) -> Self {
        match v {
            Some(d) => Cell::Text(d.format("%Y-%m-%d").to_string()),
            None => Cell::Empty,
        }
    }
}

/// Grouping key (case-folded) and the spelling shown in the Summary sheet.
fn project_key(project: &Option<String>) -> (String, &str) {
    match project.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => (p.to_lowercase(), p),
        _ => (UNASSIGNED_PROJECT.to_string(), UNASSIGNED_PROJECT),
    }
}

fn headcount_entry<'a>(
    by_project: &'a mut BTreeMap<String, ProjectHeadcount>,
    project: &Option<String>,
) -> &'a mut ProjectHeadcount {
    let (key, display) = project_key(project);
    by_project.entry(key).or_insert_with(|| ProjectHeadcount {
        project: display.to_string(),
        ..Default::default()
    })
}

/// Headcount per project, sorted by project name ignoring case.
///
/// Names differing only in case share a row, labelled with the first spelling seen.
pub fn project_headcounts(report: &MasterReport) -> Vec<ProjectHeadcount> {
    let mut by_project: BTreeMap<String, ProjectHeadcount> = BTreeMap::new();

    for employee in &report.employees {
        let entry = headcount_entry(&mut by_project, &employee.project_name);
        if employee.status == "inactive" {
            entry.employees_inactive += 1;
        } else {
            entry.employees_active += 1;
        }
    }

    for labour in &report.supply_labour {
        headcount_entry(&mut by_project, &labour.project_name).supply_labour += 1;
    }

    by_project.into_values().collect()
}

/// `master_report_<project-slug|all>_<YYYYMMDD_HHMMSS>.xlsx`
pub fn master_report_filename(project: Option<&str>, at: DateTime<Utc>) -> String {
    let scope = project
        .map(slugify)
        .filter(|slug| !slug.is_empty())
        .unwrap_or_else(|| "all".to_string());
    format!("master_report_{}_{}.xlsx", scope, at.format("%Y%m%d_%H%M%S"))
}

pub fn build_master_workbook(report: &MasterReport) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    create_summary_sheet(&mut workbook, report)?;
    create_employees_sheet(&mut workbook, report)?;
    create_supply_labour_sheet(&mut workbook, report)?;
    create_subcontractors_sheet(&mut workbook, report)?;
    create_picks_sheet(&mut workbook, report)?;

    Ok(workbook.save_to_buffer()?)
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xD9E1F2))
}

fn write_table(sheet: &mut Worksheet, headers: &[&str], rows: Vec<Vec<Cell>>) -> Result<()> {
    let header_format = header_format();
    for (col, title) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &header_format)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let row_num = i as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                Cell::Text(v) => {
                    sheet.write_string(row_num, col as u16, v)?;
                }
                Cell::Number(v) => {
                    sheet.write_number(row_num, col as u16, *v)?;
                }
                Cell::Empty => {}
            }
        }
    }

    sheet.set_freeze_panes(1, 0)?;
    if !headers.is_empty() {
        sheet.autofilter(0, 0, rows.len() as u32, headers.len() as u16 - 1)?;
    }
    sheet.autofit();
    Ok(())
}

fn create_summary_sheet(workbook: &mut Workbook, report: &MasterReport) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Summary")?;

    let title_format = Format::new().set_bold().set_font_size(14);
    let bold = Format::new().set_bold();

    sheet.write_string_with_format(0, 0, "Workforce Master Report", &title_format)?;
    sheet.write_string(1, 0, "Generated at (UTC)")?;
    sheet.write_string(1, 1, report.generated_at.format("%Y-%m-%d %H:%M:%S").to_string())?;
    sheet.write_string(2, 0, "Project")?;
    sheet.write_string(2, 1, report.project.as_deref().unwrap_or("All projects"))?;

    let active = report.employees.iter().filter(|e| e.status != "inactive").count();
    let totals = [
        ("Employees", report.employees.len()),
        ("Employees active", active),
        ("Employees inactive", report.employees.len() - active),
        ("Supply labour", report.supply_labour.len()),
        ("Subcontractors", report.subcontractors.len()),
        ("Template rows picked", report.picks.len()),
    ];

    let mut row = 4u32;
    sheet.write_string_with_format(row, 0, "Totals", &bold)?;
    row += 1;
    for (label, count) in totals {
        sheet.write_string(row, 0, label)?;
        sheet.write_number(row, 1, count as f64)?;
        row += 1;
    }

    row += 1;
    let header_format = header_format();
    for (col, title) in ["Project", "Employees active", "Employees inactive", "Supply labour"]
        .iter()
        .enumerate()
    {
        sheet.write_string_with_format(row, col as u16, *title, &header_format)?;
    }
    row += 1;

    for headcount in project_headcounts(report) {
        sheet.write_string(row, 0, &headcount.project)?;
        sheet.write_number(row, 1, headcount.employees_active as f64)?;
        sheet.write_number(row, 2, headcount.employees_inactive as f64)?;
        sheet.write_number(row, 3, headcount.supply_labour as f64)?;
        row += 1;
    }

    sheet.autofit();
    Ok(())
}

fn create_employees_sheet(workbook: &mut Workbook, report: &MasterReport) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Employees")?;

    let rows: Vec<Vec<Cell>> = report
        .employees
        .iter()
        .map(|e| {
            vec![
                e.emp_id.as_str().into(),
                e.name.as_str().into(),
                (&e.father_name).into(),
                (&e.designation).into(),
                (&e.department).into(),
                (&e.project_name).into(),
                (&e.site).into(),
                (&e.phone).into(),
                (&e.email).into(),
                e.joining_date.into(),
                e.status.as_str().into(),
            ]
        })
        .collect();

    write_table(
        sheet,
        &[
            "Emp ID",
            "Name",
            "Father Name",
            "Designation",
            "Department",
            "Project",
            "Site",
            "Phone",
            "Email",
            "Joining Date",
            "Status",
        ],
        rows,
    )
}

fn create_supply_labour_sheet(workbook: &mut Workbook, report: &MasterReport) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Supply Labour")?;

    let rows: Vec<Vec<Cell>> = report
        .supply_labour
        .iter()
        .map(|l| {
            vec![
                l.emp_id.as_str().into(),
                l.name.as_str().into(),
                l.company_name.as_str().into(),
                (&l.designation).into(),
                (&l.project_name).into(),
                (&l.phone).into(),
                l.joining_date.into(),
                l.status.as_str().into(),
            ]
        })
        .collect();

    write_table(
        sheet,
        &["Emp ID", "Name", "Company", "Designation", "Project", "Phone", "Joining Date", "Status"],
        rows,
    )
}

fn create_subcontractors_sheet(workbook: &mut Workbook, report: &MasterReport) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Subcontractors")?;

    let rows: Vec<Vec<Cell>> = report
        .subcontractors
        .iter()
        .map(|s| {
            vec![
                s.company_name.as_str().into(),
                (&s.contact_person).into(),
                (&s.phone).into(),
                (&s.email).into(),
                (&s.project_name).into(),
                (&s.work_type).into(),
                Cell::Number(s.labour_count as f64),
                s.status.as_str().into(),
            ]
        })
        .collect();

    write_table(
        sheet,
        &["Company", "Contact Person", "Phone", "Email", "Project", "Work Type", "Labour Count", "Status"],
        rows,
    )
}

fn create_picks_sheet(workbook: &mut Workbook, report: &MasterReport) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Template Picks")?;

    let rows: Vec<Vec<Cell>> = report
        .picks
        .iter()
        .map(|p| {
            vec![
                p.format_id.as_str().into(),
                p.format_name.as_str().into(),
                Cell::Number(p.row_index as f64),
                p.emp_id.as_str().into(),
                p.employee_name.as_str().into(),
                (&p.project_name).into(),
                p.picked_at.format("%Y-%m-%d %H:%M:%S").to_string().into(),
            ]
        })
        .collect();

    write_table(
        sheet,
        &["Format ID", "Format", "Row", "Emp ID", "Employee", "Project", "Picked At (UTC)"],
        rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::reader::read_workbook;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap()
    }

    fn employee(emp_id: &str, project: Option<&str>, status: &str) -> Employee {
        Employee {
            id: 1,
            emp_id: emp_id.to_string(),
            name: format!("Name {emp_id}"),
            father_name: None,
            designation: Some("Mason".to_string()),
            department: None,
            project_name: project.map(str::to_string),
            site: None,
            phone: None,
            email: None,
            joining_date: NaiveDate::from_ymd_opt(2024, 1, 2),
            status: status.to_string(),
            upload_id: None,
            created_at: at(),
            updated_at: at(),
        }
    }

    fn labour(emp_id: &str, project: Option<&str>) -> SupplyLabour {
        SupplyLabour {
            id: 1,
            emp_id: emp_id.to_string(),
            name: "Labour".to_string(),
            company_name: "Acme".to_string(),
            designation: None,
            project_name: project.map(str::to_string),
            phone: None,
            joining_date: None,
            status: "active".to_string(),
            upload_id: None,
            created_at: at(),
            updated_at: at(),
        }
    }

    fn report() -> MasterReport {
        MasterReport {
            generated_at: at(),
            project: None,
            employees: vec![
                employee("E1", Some("Tower A"), "active"),
                employee("E2", Some("Tower A"), "inactive"),
                employee("E3", None, "active"),
            ],
            supply_labour: vec![labour("S1", Some("Bridge")), labour("S2", Some("Tower A"))],
            subcontractors: vec![],
            picks: vec![],
        }
    }

    #[test]
    fn headcounts_group_by_project() {
        let counts = project_headcounts(&report());

        assert_eq!(
            counts.iter().map(|c| c.project.as_str()).collect::<Vec<_>>(),
            vec!["(unassigned)", "Bridge", "Tower A"]
        );
        let tower = &counts[2];
        assert_eq!((tower.employees_active, tower.employees_inactive, tower.supply_labour), (1, 1, 1));
    }

    #[test]
    fn headcounts_fold_project_case() {
        let mut report = report();
        report.employees[1].project_name = Some(" tower a ".to_string());
        report.supply_labour[1].project_name = Some("TOWER A".to_string());

        let counts = project_headcounts(&report);
        assert_eq!(
            counts.iter().map(|c| c.project.as_str()).collect::<Vec<_>>(),
            vec!["(unassigned)", "Bridge", "Tower A"]
        );
        let tower = &counts[2];
        assert_eq!((tower.employees_active, tower.employees_inactive, tower.supply_labour), (1, 1, 1));
    }

    #[test]
    fn filename_uses_project_slug_and_timestamp() {
        assert_eq!(master_report_filename(None, at()), "master_report_all_20260309_140507.xlsx");
        assert_eq!(
            master_report_filename(Some("Tower A (North)"), at()),
            "master_report_tower-a-north_20260309_140507.xlsx"
        );
        assert_eq!(master_report_filename(Some("!!"), at()), "master_report_all_20260309_140507.xlsx");
    }

    #[test]
    fn workbook_has_all_sheets_and_rows() {
        let bytes = build_master_workbook(&report()).unwrap();
        let sheets = read_workbook(bytes).unwrap();

        let names: Vec<_> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Summary", "Employees", "Supply Labour", "Subcontractors", "Template Picks"]
        );

        let employees = &sheets[1];
        assert_eq!(employees.headers[0], "emp_id");
        assert_eq!(employees.rows.len(), 3);
        assert_eq!(employees.rows[1].get(&["emp_id"]), Some("E2"));
        assert_eq!(employees.rows[1].get(&["status"]), Some("inactive"));
        assert_eq!(employees.rows[0].get(&["joining_date"]), Some("2024-01-02"));

        assert!(sheets[3].rows.is_empty());
    }
}
