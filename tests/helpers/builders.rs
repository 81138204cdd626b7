use efir::reports::{self, NewReport, Report, TimeSuffixNumbers};
use efir::session::Identity;
use efir::storage::{self, NewUser, Role, User};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};

/// Builder for creating test users
pub struct UserBuilder {
    name: String,
    email: String,
    password: String,
    phone: String,
    national_id: String,
    role: Role,
}

impl UserBuilder {
    pub fn new(email: &str, national_id: &str) -> Self {
        Self {
            name: "Test User".to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
            phone: "9999999999".to_string(),
            national_id: national_id.to_string(),
            role: Role::Citizen,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn police(mut self) -> Self {
        self.role = Role::Police;
        self
    }

    /// Registration body as sent to `/users/register`
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "email": self.email,
            "password": self.password,
            "phone": self.phone,
            "nationalId": self.national_id,
        })
    }

    pub async fn create(self, db: &DatabaseConnection) -> User {
        storage::create_user(
            db,
            NewUser {
                name: self.name,
                email: self.email,
                password: self.password,
                phone: self.phone,
                national_id: self.national_id,
                role: self.role,
            },
        )
        .await
        .expect("Failed to create test user")
    }
}

/// Builder for report submissions
pub struct ReportBuilder {
    input: NewReport,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self {
            input: NewReport {
                complainant_name: "A".to_string(),
                complainant_phone: "9999999999".to_string(),
                incident_type: "Theft".to_string(),
                incident_date: "2024-06-01".to_string(),
                incident_location: "Station Road".to_string(),
                description: "Mobile phone snatched near the bus stop".to_string(),
                accused_name: None,
            },
        }
    }

    pub fn with_type(mut self, incident_type: &str) -> Self {
        self.input.incident_type = incident_type.to_string();
        self
    }

    pub fn with_date(mut self, date: &str) -> Self {
        self.input.incident_date = date.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.input.description = description.to_string();
        self
    }

    pub fn with_accused(mut self, name: &str) -> Self {
        self.input.accused_name = Some(name.to_string());
        self
    }

    pub fn build(self) -> NewReport {
        self.input
    }

    /// Submission body as sent to `POST /firs`
    pub fn to_json(&self) -> Value {
        json!({
            "complainantName": self.input.complainant_name,
            "complainantPhone": self.input.complainant_phone,
            "incidentType": self.input.incident_type,
            "incidentDate": self.input.incident_date,
            "incidentLocation": self.input.incident_location,
            "description": self.input.description,
            "accusedName": self.input.accused_name,
        })
    }

    pub async fn create(self, db: &DatabaseConnection, owner: &Identity) -> Report {
        reports::create_report(db, &TimeSuffixNumbers::new("FIR"), 5, owner, self.input)
            .await
            .expect("Failed to create test report")
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
