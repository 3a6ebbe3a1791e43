//! HTTP handlers for the customer API

use crate::error::ApiError;
use crate::health::{HealthResponse, LivenessResponse, ReadinessResponse};
use crate::kubernetes::{ListFilter, OperationReport};
use crate::state::AppState;
use crate::validation::{validate_create_request, validate_update_request};
use ageplane_common::api::{ApiResponse, FieldError};
use ageplane_common::{
    CreateCustomerRequest, CustomerInstance, CustomerListResponse, InstancePhase, InstanceStatus,
    UpdateCustomerRequest,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

/// Raw list query. Values stay strings so bad numbers fall back to defaults
/// instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
    pub phase: Option<String>,
}

impl ListQuery {
    pub fn page(&self) -> usize {
        match self.page.as_deref().and_then(|p| p.parse::<usize>().ok()) {
            Some(page) if page >= 1 => page,
            _ => 1,
        }
    }

    pub fn page_size(&self) -> usize {
        match self.page_size.as_deref().and_then(|p| p.parse::<usize>().ok()) {
            Some(size) if (1..=MAX_PAGE_SIZE).contains(&size) => size,
            _ => DEFAULT_PAGE_SIZE,
        }
    }

    pub fn filter(&self) -> Result<ListFilter, ApiError> {
        match self.phase.as_deref().filter(|p| !p.is_empty()) {
            None => Ok(ListFilter::default()),
            Some(raw) => raw
                .parse::<InstancePhase>()
                .map(ListFilter::with_phase)
                .map_err(|e| {
                    ApiError::ValidationFailed(vec![FieldError {
                        field: "phase".to_string(),
                        message: e.to_string(),
                    }])
                }),
        }
    }
}

/// Slice one page out of the full listing
pub fn paginate(
    customers: Vec<CustomerInstance>,
    page: usize,
    page_size: usize,
) -> CustomerListResponse {
    let total = customers.len();
    let start = (page - 1).saturating_mul(page_size);
    let end = start.saturating_add(page_size).min(total);

    let page_items = if start >= total {
        Vec::new()
    } else {
        customers.into_iter().skip(start).take(end - start).collect()
    };

    CustomerListResponse {
        customers: page_items,
        total,
        page,
        page_size,
        has_next: end < total,
        has_prev: page > 1,
    }
}

// Service descriptors

pub async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "service": "PostgreSQL AGE Operator API",
        "version": state.health.version(),
        "description": "REST API for managing PostgreSQL AGE Operator customer instances",
        "backend": state.cluster().backend(),
        "endpoints": {
            "health": "/health",
            "customers": "/api/v1/customers",
            "create": "POST /api/v1/customers",
            "get": "GET /api/v1/customers/{name}",
            "update": "PUT /api/v1/customers/{name}",
            "delete": "DELETE /api/v1/customers/{name}",
            "status": "GET /api/v1/customers/{name}/status",
            "docs": "/api/v1/docs"
        }
    }))
}

pub async fn docs(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "title": "PostgreSQL AGE Operator API",
        "version": state.health.version(),
        "description": "REST API for managing PostgreSQL AGE Operator customer instances",
        "baseURL": "/api/v1",
        "authentication": {
            "type": "Bearer Token",
            "description": "Include 'Authorization: Bearer <api-key>' header when an API key is configured"
        },
        "endpoints": [
            {
                "method": "GET",
                "path": "/customers",
                "description": "List customer instances",
                "parameters": {
                    "page": "Page number (default: 1)",
                    "pageSize": "Items per page (default: 10, max: 100)",
                    "phase": "Only instances in this phase (Creating, Running, Failed)"
                }
            },
            {
                "method": "POST",
                "path": "/customers",
                "description": "Create a new customer instance",
                "body": "CreateCustomerRequest"
            },
            {
                "method": "GET",
                "path": "/customers/{name}",
                "description": "Get a customer instance"
            },
            {
                "method": "PUT",
                "path": "/customers/{name}",
                "description": "Update a customer instance image tag or labels",
                "body": "UpdateCustomerRequest"
            },
            {
                "method": "DELETE",
                "path": "/customers/{name}",
                "description": "Delete a customer instance and all of its resources"
            },
            {
                "method": "GET",
                "path": "/customers/{name}/status",
                "description": "Get the status of a customer instance"
            }
        ],
        "examples": {
            "createCustomer": {
                "method": "POST",
                "url": "/api/v1/customers",
                "body": {
                    "name": "acme-corp",
                    "displayName": "ACME Corporation",
                    "imageTag": "v1",
                    "config": {
                        "resources": {
                            "requests": {"cpu": "200m", "memory": "256Mi"},
                            "limits": {"cpu": "1", "memory": "1Gi"}
                        },
                        "storage": {"size": "10Gi"},
                        "highAvailability": false,
                        "backupEnabled": true,
                        "monitoringEnabled": true
                    },
                    "labels": {"environment": "production"}
                }
            },
            "listCustomers": {
                "method": "GET",
                "url": "/api/v1/customers?page=1&pageSize=10"
            },
            "getCustomer": {
                "method": "GET",
                "url": "/api/v1/customers/acme-corp"
            }
        },
        "responseFormat": {
            "success": "boolean",
            "message": "string (optional)",
            "data": "object (optional)",
            "error": {
                "code": "string",
                "message": "string",
                "details": "array of {field, message} (optional)"
            }
        }
    }))
}

// Health

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(state.health.health())
}

pub async fn liveness_probe(State(state): State<Arc<AppState>>) -> Json<LivenessResponse> {
    Json(state.health.liveness())
}

pub async fn readiness_probe(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let response = state.health.readiness(state.cluster()).await;
    let status = if response.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

// Customers

pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateCustomerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CustomerInstance>>), ApiError> {
    let Json(request) = payload?;
    validate_create_request(&request).map_err(ApiError::ValidationFailed)?;

    let instance = state.provisioner.create(&request).await?;
    info!(customer = %instance.name, "Customer instance created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(instance).with_message("Customer instance created successfully")),
    ))
}

pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<CustomerListResponse>>, ApiError> {
    let filter = query.filter()?;
    let customers = state.provisioner.list(&filter).await?;

    Ok(Json(ApiResponse::ok(paginate(
        customers,
        query.page(),
        query.page_size(),
    ))))
}

pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<CustomerInstance>>, ApiError> {
    let instance = state.provisioner.get(&name).await?;
    Ok(Json(ApiResponse::ok(instance)))
}

pub async fn update_customer(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    payload: Result<Json<UpdateCustomerRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<CustomerInstance>>, ApiError> {
    let Json(request) = payload?;
    validate_update_request(&request).map_err(ApiError::ValidationFailed)?;

    let instance = state.provisioner.update(&name, &request).await?;
    info!(customer = %name, "Customer instance updated");

    Ok(Json(
        ApiResponse::ok(instance).with_message("Customer instance updated successfully"),
    ))
}

pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<OperationReport>>, ApiError> {
    let report = state.provisioner.delete(&name).await?;
    info!(customer = %name, "Customer instance deleted");

    Ok(Json(
        ApiResponse::ok(report).with_message("Customer instance deleted successfully"),
    ))
}

pub async fn customer_status(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<InstanceStatus>>, ApiError> {
    let instance = state.provisioner.get(&name).await?;
    Ok(Json(ApiResponse::ok(instance.status)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ageplane_common::CustomerConfig;
    use chrono::Utc;

    fn instance(name: &str) -> CustomerInstance {
        let now = Utc::now();
        CustomerInstance {
            id: name.to_string(),
            name: name.to_string(),
            display_name: String::new(),
            image_tag: "latest".to_string(),
            namespace: format!("customer-{}", name),
            status: InstanceStatus {
                phase: InstancePhase::Running,
                message: String::new(),
                ready: true,
                replicas: 1,
                ready_replicas: 1,
                last_updated: now,
            },
            config: CustomerConfig::default(),
            labels: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn query(page: Option<&str>, page_size: Option<&str>) -> ListQuery {
        ListQuery {
            page: page.map(String::from),
            page_size: page_size.map(String::from),
            phase: None,
        }
    }

    #[test]
    fn test_query_defaults_and_fallbacks() {
        assert_eq!(query(None, None).page(), 1);
        assert_eq!(query(None, None).page_size(), 10);
        assert_eq!(query(Some("0"), Some("0")).page(), 1);
        assert_eq!(query(Some("abc"), Some("101")).page_size(), 10);
        assert_eq!(query(Some("-2"), Some("xyz")).page(), 1);
        assert_eq!(query(Some("3"), Some("100")).page(), 3);
        assert_eq!(query(Some("3"), Some("100")).page_size(), 100);
    }

    #[test]
    fn test_phase_filter_parsing() {
        let mut q = query(None, None);
        assert!(q.filter().unwrap().phase.is_none());

        q.phase = Some("running".to_string());
        assert_eq!(q.filter().unwrap().phase, Some(InstancePhase::Running));

        q.phase = Some("sleeping".to_string());
        match q.filter() {
            Err(ApiError::ValidationFailed(fields)) => assert_eq!(fields[0].field, "phase"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_paginate_middle_page() {
        let customers: Vec<_> = (0..25).map(|i| instance(&format!("c{}", i))).collect();
        let page = paginate(customers, 2, 10);

        assert_eq!(page.total, 25);
        assert_eq!(page.customers.len(), 10);
        assert_eq!(page.customers[0].name, "c10");
        assert!(page.has_next);
        assert!(page.has_prev);
    }

    #[test]
    fn test_paginate_last_and_past_end() {
        let customers: Vec<_> = (0..25).map(|i| instance(&format!("c{}", i))).collect();

        let last = paginate(customers.clone(), 3, 10);
        assert_eq!(last.customers.len(), 5);
        assert!(!last.has_next);

        let past = paginate(customers, 9, 10);
        assert!(past.customers.is_empty());
        assert_eq!(past.total, 25);
        assert!(!past.has_next);
        assert!(past.has_prev);
    }
}
