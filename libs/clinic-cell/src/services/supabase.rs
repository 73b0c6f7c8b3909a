use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::DirectoryError;
use crate::models::{Clinic, CreateClinicRequest, CreateDoctorRequest, Doctor, UpdateDoctorRequest};
use crate::services::directory::ClinicDirectory;

/// Directory backed by the `clinics` and `doctors` PostgREST tables.
pub struct SupabaseDirectory {
    supabase: SupabaseClient,
}

impl SupabaseDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn select<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, DirectoryError> {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(|e| {
                error!("Supabase select failed for {}: {}", path, e);
                DirectoryError::DatabaseError(e.to_string())
            })?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| DirectoryError::DatabaseError(e.to_string())))
            .collect()
    }

    async fn write<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Value,
    ) -> Result<Option<T>, DirectoryError> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(method, path, None, Some(body), Some(SupabaseClient::return_representation()))
            .await
            .map_err(|e| {
                error!("Supabase write failed for {}: {}", path, e);
                DirectoryError::DatabaseError(e.to_string())
            })?;

        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| DirectoryError::DatabaseError(e.to_string())),
            None => Ok(None),
        }
    }

    async fn email_taken(&self, email: &str, except: Option<Uuid>) -> Result<bool, DirectoryError> {
        let path = format!(
            "/rest/v1/doctors?email=ilike.{}&select=id",
            urlencoding::encode(&escape_like(email))
        );
        let rows: Vec<Value> = self.select(&path).await?;
        let except = except.map(|id| id.to_string());

        Ok(rows.iter().any(|row| {
            row.get("id").and_then(Value::as_str).map(str::to_string) != except
        }))
    }
}

/// Makes `ilike` match the value literally: `%` and `_` are wildcards there.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl ClinicDirectory for SupabaseDirectory {
    async fn create_clinic(&self, request: CreateClinicRequest) -> Result<Clinic, DirectoryError> {
        request.validate()?;
        debug!("Creating clinic {}", request.name);

        let body = json!({
            "id": Uuid::new_v4(),
            "name": request.name.trim(),
            "address": request.address,
            "phone": request.phone,
            "created_at": Utc::now().to_rfc3339(),
        });

        self.write(Method::POST, "/rest/v1/clinics", body)
            .await?
            .ok_or_else(|| DirectoryError::DatabaseError("Failed to create clinic".to_string()))
    }

    async fn get_clinic(&self, clinic_id: Uuid) -> Result<Clinic, DirectoryError> {
        let path = format!("/rest/v1/clinics?id=eq.{}", clinic_id);
        self.select(&path)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::ClinicNotFound(clinic_id.to_string()))
    }

    async fn list_clinics(&self) -> Result<Vec<Clinic>, DirectoryError> {
        self.select("/rest/v1/clinics?order=name.asc").await
    }

    async fn create_doctor(
        &self,
        clinic_id: Uuid,
        request: CreateDoctorRequest,
    ) -> Result<Doctor, DirectoryError> {
        request.validate()?;

        self.get_clinic(clinic_id).await?;

        if self.email_taken(&request.email, None).await? {
            return Err(DirectoryError::DuplicateEmail(request.email));
        }
        if self.find_doctor_by_uid(&request.uid).await?.is_some() {
            return Err(DirectoryError::DuplicateUid(request.uid));
        }

        let now = Utc::now().to_rfc3339();
        let body = json!({
            "id": Uuid::new_v4(),
            "clinic_id": clinic_id,
            "uid": request.uid,
            "email": request.email,
            "phone": request.phone,
            "name": request.name.trim(),
            "specialization": request.specialization,
            "is_active": true,
            "created_at": now,
            "updated_at": now,
        });

        let doctor: Doctor = self
            .write(Method::POST, "/rest/v1/doctors", body)
            .await?
            .ok_or_else(|| DirectoryError::DatabaseError("Failed to create doctor".to_string()))?;

        debug!("Doctor created with ID: {}", doctor.id);
        Ok(doctor)
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DirectoryError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        self.select(&path)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::DoctorNotFound(doctor_id.to_string()))
    }

    async fn find_doctor_by_uid(&self, uid: &str) -> Result<Option<Doctor>, DirectoryError> {
        let path = format!("/rest/v1/doctors?uid=eq.{}", urlencoding::encode(uid));
        Ok(self.select(&path).await?.into_iter().next())
    }

    async fn update_doctor(
        &self,
        doctor_id: Uuid,
        request: UpdateDoctorRequest,
    ) -> Result<Doctor, DirectoryError> {
        request.validate()?;

        if let Some(email) = &request.email {
            if self.email_taken(email, Some(doctor_id)).await? {
                return Err(DirectoryError::DuplicateEmail(email.clone()));
            }
        }

        let mut update_data = serde_json::Map::new();
        if let Some(email) = request.email {
            update_data.insert("email".to_string(), json!(email));
        }
        if let Some(phone) = request.phone {
            update_data.insert("phone".to_string(), json!(phone));
        }
        if let Some(name) = request.name {
            update_data.insert("name".to_string(), json!(name.trim()));
        }
        if let Some(specialization) = request.specialization {
            update_data.insert("specialization".to_string(), json!(specialization));
        }
        if let Some(is_active) = request.is_active {
            update_data.insert("is_active".to_string(), json!(is_active));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        self.write(Method::PATCH, &path, Value::Object(update_data))
            .await?
            .ok_or_else(|| DirectoryError::DoctorNotFound(doctor_id.to_string()))
    }

    async fn list_doctors(&self, clinic_id: Uuid, active_only: bool) -> Result<Vec<Doctor>, DirectoryError> {
        self.get_clinic(clinic_id).await?;

        let mut path = format!("/rest/v1/doctors?clinic_id=eq.{}&order=name.asc", clinic_id);
        if active_only {
            path.push_str("&is_active=eq.true");
        }
        self.select(&path).await
    }
}
