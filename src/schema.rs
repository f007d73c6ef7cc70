use sqlx::MySqlPool;
use tracing::info;

/// DDL in dependency order; every statement is `IF NOT EXISTS` so the
/// bootstrap can run before every load.
const TABLES: &[(&str, &str)] = &[
    (
        "department",
        r#"
        CREATE TABLE IF NOT EXISTS department (
            department_id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
            department_name VARCHAR(100) NOT NULL,
            business_unit VARCHAR(100) NOT NULL,
            parent_department VARCHAR(100),
            status VARCHAR(20) DEFAULT 'Active',
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            UNIQUE KEY uq_department_name (department_name)
        )
        "#,
    ),
    (
        "designation",
        r#"
        CREATE TABLE IF NOT EXISTS designation (
            designation_id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
            designation_name VARCHAR(100) NOT NULL,
            level VARCHAR(50),
            status VARCHAR(20) DEFAULT 'Active',
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            UNIQUE KEY uq_designation_name (designation_name)
        )
        "#,
    ),
    (
        "employee",
        r#"
        CREATE TABLE IF NOT EXISTS employee (
            employee_code VARCHAR(20) PRIMARY KEY,
            employee_name VARCHAR(200) NOT NULL,
            email VARCHAR(255) UNIQUE,
            mobile_number VARCHAR(20),
            date_of_joining DATE NOT NULL,
            employee_type VARCHAR(50) NOT NULL,
            grade VARCHAR(20),
            status VARCHAR(20) DEFAULT 'Active',
            department_id BIGINT UNSIGNED,
            department_name VARCHAR(100),
            designation_id BIGINT UNSIGNED,
            primary_manager_id VARCHAR(20),
            past_experience DECIMAL(5,2) DEFAULT 0,
            current_experience DECIMAL(5,2) DEFAULT 0,
            total_experience DECIMAL(5,2) AS (current_experience + past_experience) STORED,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (department_id) REFERENCES department(department_id),
            FOREIGN KEY (designation_id) REFERENCES designation(designation_id),
            FOREIGN KEY (primary_manager_id) REFERENCES employee(employee_code)
        )
        "#,
    ),
    (
        "employee_personal",
        r#"
        CREATE TABLE IF NOT EXISTS employee_personal (
            employee_code VARCHAR(20) PRIMARY KEY,
            gender VARCHAR(10) CHECK (gender IN ('Male','Female','Other')),
            date_of_birth DATE,
            marital_status VARCHAR(20),
            present_address TEXT,
            permanent_address TEXT,
            pan_number VARCHAR(20) UNIQUE,
            aadhaar_number VARCHAR(20) UNIQUE,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (employee_code) REFERENCES employee(employee_code) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "employee_financial",
        r#"
        CREATE TABLE IF NOT EXISTS employee_financial (
            employee_code VARCHAR(20) PRIMARY KEY,
            bank_name VARCHAR(100),
            account_number VARCHAR(50) UNIQUE,
            ifsc_code VARCHAR(20),
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (employee_code) REFERENCES employee(employee_code) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "project",
        r#"
        CREATE TABLE IF NOT EXISTS project (
            project_id VARCHAR(50) PRIMARY KEY,
            project_name VARCHAR(200) NOT NULL,
            client_name VARCHAR(200),
            status VARCHAR(20) DEFAULT 'Active',
            start_date DATE,
            end_date DATE,
            manager_id VARCHAR(20),
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (manager_id) REFERENCES employee(employee_code)
        )
        "#,
    ),
    (
        "project_allocation",
        r#"
        CREATE TABLE IF NOT EXISTS project_allocation (
            allocation_id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
            employee_code VARCHAR(20) NOT NULL,
            project_id VARCHAR(50) NOT NULL,
            allocation_percentage DECIMAL(5,2) CHECK (allocation_percentage >= 0 AND allocation_percentage <= 100),
            effective_from DATE NOT NULL,
            effective_to DATE,
            status VARCHAR(20) DEFAULT 'Active',
            created_by VARCHAR(20),
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            change_reason TEXT,
            CONSTRAINT chk_effective_dates CHECK (effective_to IS NULL OR effective_to >= effective_from),
            FOREIGN KEY (employee_code) REFERENCES employee(employee_code),
            FOREIGN KEY (project_id) REFERENCES project(project_id)
        )
        "#,
    ),
    (
        "timesheet",
        r#"
        CREATE TABLE IF NOT EXISTS timesheet (
            timesheet_id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
            work_date DATE NOT NULL,
            employee_code VARCHAR(20) NOT NULL,
            project_id VARCHAR(50) NOT NULL,
            hours_worked DECIMAL(4,2) CHECK (hours_worked >= 0 AND hours_worked <= 24),
            task_description TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            UNIQUE KEY uq_timesheet_natural (employee_code, project_id, work_date),
            FOREIGN KEY (employee_code) REFERENCES employee(employee_code),
            FOREIGN KEY (project_id) REFERENCES project(project_id)
        )
        "#,
    ),
    (
        "attendance",
        r#"
        CREATE TABLE IF NOT EXISTS attendance (
            attendance_id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
            attendance_date DATE NOT NULL,
            employee_code VARCHAR(20) NOT NULL,
            clock_in_time TIME,
            clock_out_time TIME,
            total_hours DECIMAL(4,2) AS (
                CASE
                    WHEN clock_in_time IS NOT NULL AND clock_out_time IS NOT NULL
                    THEN TIME_TO_SEC(TIMEDIFF(clock_out_time, clock_in_time)) / 3600
                    ELSE NULL
                END
            ) STORED,
            attendance_type VARCHAR(20) DEFAULT 'Present',
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            UNIQUE KEY uq_attendance_natural (employee_code, attendance_date),
            FOREIGN KEY (employee_code) REFERENCES employee(employee_code)
        )
        "#,
    ),
    (
        "employee_exit",
        r#"
        CREATE TABLE IF NOT EXISTS employee_exit (
            exit_id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
            employee_code VARCHAR(20) UNIQUE NOT NULL,
            exit_date DATE NOT NULL,
            last_working_date DATE,
            exit_reason VARCHAR(200),
            exit_comments TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (employee_code) REFERENCES employee(employee_code)
        )
        "#,
    ),
    (
        "resource_utilization",
        r#"
        CREATE TABLE IF NOT EXISTS resource_utilization (
            project_id VARCHAR(50) NOT NULL,
            week_start_date DATE NOT NULL,
            estimated_hours DECIMAL(10,2) NOT NULL DEFAULT 0,
            PRIMARY KEY (project_id, week_start_date),
            FOREIGN KEY (project_id) REFERENCES project(project_id)
        )
        "#,
    ),
];

/// Create any missing tables. Safe to call on every start.
pub async fn bootstrap(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    for (name, ddl) in TABLES {
        sqlx::query(ddl).execute(pool).await?;
        info!(table = name, "ensured table");
    }
    info!(tables = TABLES.len(), "schema bootstrap complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_tables_precede_dependents() {
        let order: Vec<&str> = TABLES.iter().map(|(n, _)| *n).collect();
        let pos = |t: &str| order.iter().position(|n| *n == t).unwrap();
        assert!(pos("department") < pos("employee"));
        assert!(pos("designation") < pos("employee"));
        assert!(pos("employee") < pos("project_allocation"));
        assert!(pos("project") < pos("project_allocation"));
        assert!(pos("project") < pos("timesheet"));
        assert!(pos("employee") < pos("employee_exit"));
    }

    #[test]
    fn every_statement_is_idempotent() {
        for (_, ddl) in TABLES {
            assert!(ddl.contains("IF NOT EXISTS"));
        }
    }
}
