//! One method per RideNow endpoint.
//!
//! Inputs are validated before anything is sent. Endpoints whose callers act
//! on `success`/`message` return the whole envelope; the rest return `data`.

use std::path::Path;

use chrono::NaiveDateTime;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::client::{ApiClient, RequestConfig};
use super::error::ApiError;
use super::transport::{FilePart, RequestBody};
use crate::models::{
    AuthPayload, Booking, BookingRequest, DocumentKind, Envelope, ProfileUpdate, SearchQuery,
    Vehicle, VehiclePricing,
};
use crate::utils::format::DATETIME_WIRE_FORMAT;
use crate::validation;

/// Extensions accepted for a profile photo
const PHOTO_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "heic", "webp"];

impl ApiClient {
    // ===== Authentication =====

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthPayload, ApiError> {
        validation::validate_login(email, password)?;
        let body = json!({ "email": email.trim(), "password": password });
        let env: Envelope<AuthPayload> = self.send_json(Method::POST, "users/login", &body).await?;
        info!("Login accepted");
        env.into_data()
    }

    /// Exchange a Google ID token for a RideNow session
    pub async fn google_login(&self, id_token: &str) -> Result<AuthPayload, ApiError> {
        validation::require(id_token, "Google token")?;
        let body = json!({ "token": id_token });
        let env: Envelope<AuthPayload> = self
            .send_json(Method::POST, "users/google-login", &body)
            .await?;
        env.into_data()
    }

    /// Create an account. On success the server emails an OTP.
    pub async fn register(&self, email: &str, password: &str) -> Result<Envelope<Value>, ApiError> {
        validation::validate_email(email)?;
        validation::validate_password(password)?;
        let body = json!({ "email": email.trim(), "password": password });
        self.send_json(Method::POST, "users/register", &body).await
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<Envelope<Value>, ApiError> {
        validation::validate_email(email)?;
        validation::validate_otp(otp)?;
        let body = json!({ "email": email.trim(), "otp": otp });
        self.send_json(Method::POST, "users/verify-otp", &body).await
    }

    // ===== Profile and documents =====

    pub async fn current_user(&self) -> Result<Value, ApiError> {
        self.get::<Value>("users/current-user", Vec::new())
            .await?
            .into_data()
    }

    /// Update profile fields; returns the updated user record
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Value, ApiError> {
        if update.is_empty() {
            return Err(validation::ValidationError::MissingField("At least one profile field").into());
        }
        self.send_json::<Value, _>(Method::PATCH, "profile/update", update)
            .await?
            .into_data()
    }

    /// Upload a profile photo. `data.photo` carries the new photo URL.
    pub async fn upload_profile_photo(&self, path: &Path) -> Result<Envelope<Value>, ApiError> {
        validation::validate_upload(path, &PHOTO_EXTENSIONS, "image")?;
        debug!(path = %path.display(), "Uploading profile photo");
        let body = RequestBody::Multipart {
            fields: Vec::new(),
            files: vec![FilePart::new("photo", path)],
        };
        self.call(Method::POST, "profile/upload-photo", body, RequestConfig::default())
            .await
    }

    pub async fn documents(&self) -> Result<Value, ApiError> {
        self.get::<Value>("users/documents", Vec::new())
            .await?
            .into_data()
    }

    /// Submit a PDF scan of an identity document for verification
    pub async fn verify_document(&self, kind: DocumentKind, path: &Path) -> Result<Envelope<Value>, ApiError> {
        validation::validate_upload(path, &["pdf"], "PDF")?;
        info!(document = kind.label(), "Submitting document for verification");
        let body = RequestBody::Multipart {
            fields: Vec::new(),
            files: vec![FilePart::new("file", path)],
        };
        self.call(Method::POST, kind.upload_path(), body, RequestConfig::default())
            .await
    }

    // ===== Vehicles =====

    pub async fn search_vehicles(&self, query: &SearchQuery) -> Result<Vec<Vehicle>, ApiError> {
        let env: Envelope<Vec<Vehicle>> = self.get("vehicles/search", query.to_query()).await?;
        // An empty result set may come back without `data`
        Ok(env.data.unwrap_or_default())
    }

    pub async fn vehicle_details(&self, vehicle_id: &str) -> Result<Vehicle, ApiError> {
        validation::validate_id(vehicle_id, "Vehicle id")?;
        self.get::<Vehicle>(&format!("vehicles/{}", vehicle_id), Vec::new())
            .await?
            .into_data()
    }

    pub async fn vehicle_pricing(
        &self,
        vehicle_id: &str,
        pickup: &NaiveDateTime,
        drop: &NaiveDateTime,
    ) -> Result<VehiclePricing, ApiError> {
        validation::validate_id(vehicle_id, "Vehicle id")?;
        validation::validate_window(pickup, drop)?;
        let query = vec![
            ("pickup".to_string(), pickup.format(DATETIME_WIRE_FORMAT).to_string()),
            ("drop".to_string(), drop.format(DATETIME_WIRE_FORMAT).to_string()),
        ];
        self.get::<VehiclePricing>(&format!("vehicles/{}/pricing", vehicle_id), query)
            .await?
            .into_data()
    }

    // ===== Bookings =====

    pub async fn book_vehicle(&self, request: &BookingRequest) -> Result<Envelope<Value>, ApiError> {
        validation::validate_id(&request.vehicle_id, "Vehicle id")?;
        info!(vehicle = %request.vehicle_id, "Booking vehicle");
        self.send_json(
            Method::POST,
            &format!("vehicles/{}/book", request.vehicle_id),
            &request.to_body(),
        )
        .await
    }

    pub async fn my_bookings(&self) -> Result<Vec<Booking>, ApiError> {
        let env: Envelope<Vec<Booking>> = self.get("vehicles/my-bookings", Vec::new()).await?;
        Ok(env.data.unwrap_or_default())
    }

    pub async fn end_booking(&self, vehicle_id: &str) -> Result<Envelope<Value>, ApiError> {
        validation::validate_id(vehicle_id, "Vehicle id")?;
        info!(vehicle = %vehicle_id, "Ending booking");
        self.call(
            Method::POST,
            &format!("vehicles/{}/end-booking", vehicle_id),
            RequestBody::Empty,
            RequestConfig::default(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedTransport;
    use crate::auth::credentials::{CredentialStore, ACCESS_TOKEN_KEY};
    use crate::auth::MemoryStore;
    use crate::validation::ValidationError;
    use std::sync::Arc;

    async fn signed_in(transport: &Arc<ScriptedTransport>) -> ApiClient {
        let store = Arc::new(MemoryStore::new());
        store.set(ACCESS_TOKEN_KEY, "live").await.expect("seed");
        ApiClient::new(transport.clone(), store)
    }

    fn json_body(transport: &ScriptedTransport, path: &str) -> Value {
        match &transport.requests_to(path)[0].body {
            RequestBody::Json(body) => body.clone(),
            other => panic!("expected JSON body, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_parses_session_payload() {
        let transport = Arc::new(ScriptedTransport::new("live"));
        transport.public_route(
            "users/login",
            200,
            json!({"success": true, "data": {
                "user": {"_id": "u1", "email": "asha@ridenow.in"},
                "accessToken": "at-1",
                "refreshToken": "rt-1"
            }}),
        );
        let client = ApiClient::new(transport.clone(), Arc::new(MemoryStore::new()));

        let payload = client.login(" asha@ridenow.in ", "hunter22").await.expect("login succeeds");
        assert_eq!(payload.access_token, "at-1");
        assert_eq!(payload.user["_id"], "u1");
        assert_eq!(
            json_body(&transport, "users/login"),
            json!({"email": "asha@ridenow.in", "password": "hunter22"})
        );
        assert_eq!(transport.requests_to("users/login")[0].method, Method::POST);
    }

    #[tokio::test]
    async fn test_login_failure_exposes_server_message() {
        let transport = Arc::new(ScriptedTransport::new("live"));
        transport.public_route("users/login", 400, json!({"success": false, "message": "Invalid credentials"}));
        let client = ApiClient::new(transport.clone(), Arc::new(MemoryStore::new()));

        let err = client.login("asha@ridenow.in", "wrong").await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid credentials");
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_network() {
        let transport = Arc::new(ScriptedTransport::new("live"));
        let client = ApiClient::new(transport.clone(), Arc::new(MemoryStore::new()));

        let err = client.register("not-an-email", "hunter22").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::InvalidEmail)));
        let err = client.verify_otp("asha@ridenow.in", "12").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::InvalidOtp { .. })));
        let err = client.end_booking("../users/profile").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::InvalidId(_))));
        let err = client.update_profile(&ProfileUpdate::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::MissingField(_))));

        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_register_and_verify_otp_return_envelope() {
        let transport = Arc::new(ScriptedTransport::new("live"));
        transport.public_route("users/register", 201, json!({"success": true, "data": null, "message": "OTP sent"}));
        transport.public_route("users/verify-otp", 200, json!({"success": true, "data": {"verified": true}}));
        let client = ApiClient::new(transport.clone(), Arc::new(MemoryStore::new()));

        let env = client.register("asha@ridenow.in", "hunter22").await.expect("register");
        assert!(env.success);
        assert_eq!(env.message.as_deref(), Some("OTP sent"));

        let env = client.verify_otp("asha@ridenow.in", "042917").await.expect("verify");
        assert!(env.success);
        assert_eq!(
            json_body(&transport, "users/verify-otp"),
            json!({"email": "asha@ridenow.in", "otp": "042917"})
        );
    }

    #[tokio::test]
    async fn test_search_sends_city_and_window() {
        let transport = Arc::new(ScriptedTransport::new("live"));
        transport.route(
            "vehicles/search",
            200,
            json!({"success": true, "data": [{"_id": "veh_01"}, {"_id": "veh_02"}]}),
        );
        let client = signed_in(&transport).await;

        let query = SearchQuery::new("Pune", "2026-03-01 09:00", "2026-03-02 09:00").expect("query");
        let vehicles = client.search_vehicles(&query).await.expect("search");
        assert_eq!(vehicles.len(), 2);

        let sent = &transport.requests_to("vehicles/search")[0];
        assert_eq!(sent.method, Method::GET);
        assert_eq!(sent.query, query.to_query());
    }

    #[tokio::test]
    async fn test_empty_search_without_data() {
        let transport = Arc::new(ScriptedTransport::new("live"));
        transport.route("vehicles/search", 200, json!({"success": true, "message": "No vehicles available"}));
        let client = signed_in(&transport).await;

        let query = SearchQuery::new("Goa", "2026-03-01 09:00", "2026-03-02 09:00").expect("query");
        assert!(client.search_vehicles(&query).await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn test_pricing_and_booking_paths() {
        let transport = Arc::new(ScriptedTransport::new("live"));
        transport.route(
            "vehicles/veh_01/pricing",
            200,
            json!({"success": true, "data": {
                "vehicleDetails": {"_id": "veh_01", "scootyModel": "Ather 450X"},
                "pricingDetails": {"total_price_estimate": 540.0}
            }}),
        );
        transport.route("vehicles/veh_01/book", 201, json!({"success": true, "data": {"bookingId": "b1"}}));
        let client = signed_in(&transport).await;

        let pickup = validation::parse_datetime("2026-03-01 09:00").expect("pickup");
        let drop = validation::parse_datetime("2026-03-01 18:00").expect("drop");
        let pricing = client.vehicle_pricing("veh_01", &pickup, &drop).await.expect("pricing");
        assert_eq!(pricing.total_estimate(), Some(540.0));
        assert_eq!(
            transport.requests_to("vehicles/veh_01/pricing")[0].query,
            vec![
                ("pickup".to_string(), "2026-03-01T09:00:00".to_string()),
                ("drop".to_string(), "2026-03-01T18:00:00".to_string()),
            ]
        );

        let request = BookingRequest::new("veh_01", pickup, drop, pricing.total_estimate()).expect("booking");
        let env = client.book_vehicle(&request).await.expect("book");
        assert!(env.success);
        assert_eq!(json_body(&transport, "vehicles/veh_01/book"), request.to_body());
    }

    #[tokio::test]
    async fn test_bookings_and_end_booking() {
        let transport = Arc::new(ScriptedTransport::new("live"));
        transport.route(
            "vehicles/my-bookings",
            200,
            json!({"success": true, "data": [{"vehicleId": "veh_01", "bookingStatus": "confirmed"}]}),
        );
        transport.route("vehicles/veh_01/end-booking", 200, json!({"success": true, "data": null}));
        let client = signed_in(&transport).await;

        let bookings = client.my_bookings().await.expect("bookings");
        assert_eq!(bookings.len(), 1);
        assert!(bookings[0].is_active());

        let env = client.end_booking("veh_01").await.expect("end booking");
        assert!(env.success);
        let sent = &transport.requests_to("vehicles/veh_01/end-booking")[0];
        assert_eq!(sent.method, Method::POST);
        assert_eq!(sent.body, RequestBody::Empty);
    }

    #[tokio::test]
    async fn test_document_upload_is_multipart_pdf() {
        let dir = std::env::temp_dir().join(format!("ridenow-endpoints-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let pdf = dir.join("aadhar.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").expect("write fixture");
        let jpg = dir.join("aadhar.jpg");
        std::fs::write(&jpg, b"\xFF\xD8").expect("write fixture");

        let transport = Arc::new(ScriptedTransport::new("live"));
        transport.route("users/verify-aadhar", 200, json!({"success": true, "message": "Aadhar verified"}));
        let client = signed_in(&transport).await;

        let env = client.verify_document(DocumentKind::Aadhar, &pdf).await.expect("upload");
        assert_eq!(env.message_or(""), "Aadhar verified");
        match &transport.requests_to("users/verify-aadhar")[0].body {
            RequestBody::Multipart { files, .. } => {
                assert_eq!(files.len(), 1);
                assert_eq!(files[0].field, "file");
                assert_eq!(files[0].mime, "application/pdf");
            }
            other => panic!("expected multipart body, got {:?}", other),
        }

        let err = client.verify_document(DocumentKind::DrivingLicence, &jpg).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::UnsupportedFile { .. })));
        assert!(transport.requests_to("users/verify-dl").is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }
}
