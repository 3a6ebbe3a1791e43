//! Input validation
//! Checks customer names, labels, image tags and resource quantities before
//! anything reaches the cluster

use ageplane_common::api::FieldError;
use ageplane_common::{
    CreateCustomerRequest, CustomerConfig, Error, UpdateCustomerRequest, MAX_CUSTOMER_NAME_LENGTH,
};
use crate::kubernetes::resources::{LABEL_INSTANCE, LABEL_NAME};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Maximum lengths imposed by Kubernetes on label parts
pub const MAX_LABEL_NAME_LENGTH: usize = 63;
pub const MAX_LABEL_PREFIX_LENGTH: usize = 253;
pub const MAX_IMAGE_TAG_LENGTH: usize = 128;

/// Regex patterns for validation
static CUSTOMER_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").unwrap()
});

static LABEL_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").unwrap()
});

static DNS_SUBDOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

static QUANTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+(\.[0-9]+)?|\.[0-9]+)(m|k|M|G|T|P|E|Ki|Mi|Gi|Ti|Pi|Ei)?$").unwrap()
});

static IMAGE_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").unwrap()
});

/// Validation result type
pub type ValidationResult<T> = Result<T, Error>;

/// Customer name validation
///
/// Names are embedded verbatim in namespace and workload names, so they must
/// be short DNS labels.
pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(Error::Validation("Name is required".to_string()));
    }

    if name.len() > MAX_CUSTOMER_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "Name must be {} characters or less",
            MAX_CUSTOMER_NAME_LENGTH
        )));
    }

    if !CUSTOMER_NAME_REGEX.is_match(name) {
        return Err(Error::Validation(
            "Name must be a valid Kubernetes name (lowercase alphanumeric with optional hyphens)"
                .to_string(),
        ));
    }

    Ok(())
}

/// Label key validation (`[prefix/]name`)
pub fn validate_label_key(key: &str) -> ValidationResult<()> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty()
            || prefix.len() > MAX_LABEL_PREFIX_LENGTH
            || !DNS_SUBDOMAIN_REGEX.is_match(prefix)
        {
            return Err(Error::Validation(format!(
                "Label key prefix '{}' must be a DNS subdomain",
                prefix
            )));
        }
    }

    if name.is_empty() || name.len() > MAX_LABEL_NAME_LENGTH || !LABEL_NAME_REGEX.is_match(name) {
        return Err(Error::Validation(format!(
            "Label key '{}' must be at most {} alphanumeric characters, '-', '_' or '.'",
            key, MAX_LABEL_NAME_LENGTH
        )));
    }

    Ok(())
}

/// Label value validation; empty values are allowed
pub fn validate_label_value(value: &str) -> ValidationResult<()> {
    if value.is_empty() {
        return Ok(());
    }

    if value.len() > MAX_LABEL_NAME_LENGTH || !LABEL_NAME_REGEX.is_match(value) {
        return Err(Error::Validation(format!(
            "Label value '{}' must be at most {} alphanumeric characters, '-', '_' or '.'",
            value, MAX_LABEL_NAME_LENGTH
        )));
    }

    Ok(())
}

/// Resource quantity validation ("250m", "1Gi", "2")
pub fn validate_quantity(quantity: &str) -> ValidationResult<()> {
    if !QUANTITY_REGEX.is_match(quantity) {
        return Err(Error::Validation(format!(
            "'{}' is not a valid resource quantity",
            quantity
        )));
    }

    Ok(())
}

/// Image tag validation
pub fn validate_image_tag(tag: &str) -> ValidationResult<()> {
    if tag.len() > MAX_IMAGE_TAG_LENGTH || !IMAGE_TAG_REGEX.is_match(tag) {
        return Err(Error::Validation(format!("'{}' is not a valid image tag", tag)));
    }

    Ok(())
}

/// Collects field errors across a whole request
#[derive(Default)]
struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    fn check(&mut self, field: impl Into<String>, result: ValidationResult<()>) {
        if let Err(e) = result {
            let message = match e {
                Error::Validation(msg) => msg,
                other => other.to_string(),
            };
            self.0.push(FieldError {
                field: field.into(),
                message,
            });
        }
    }

    fn labels(&mut self, labels: &BTreeMap<String, String>) {
        for (key, value) in labels {
            self.check(format!("labels.{}", key), validate_label_key(key));
            self.check(format!("labels.{}", key), validate_label_value(value));
        }
    }

    fn config(&mut self, config: &CustomerConfig) {
        let quantities = [
            ("config.resources.requests.cpu", &config.resources.requests.cpu),
            ("config.resources.requests.memory", &config.resources.requests.memory),
            ("config.resources.limits.cpu", &config.resources.limits.cpu),
            ("config.resources.limits.memory", &config.resources.limits.memory),
            ("config.storage.size", &config.storage.size),
            ("config.storage.backupSize", &config.storage.backup_size),
        ];

        for (field, value) in quantities {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                self.check(field, validate_quantity(value));
            }
        }
    }

    fn into_result(self) -> Result<(), Vec<FieldError>> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.0)
        }
    }
}

/// Validate a create request, reporting every offending field
pub fn validate_create_request(request: &CreateCustomerRequest) -> Result<(), Vec<FieldError>> {
    let mut errors = FieldErrors::default();

    errors.check("name", validate_customer_name(&request.name));
    if let Some(tag) = request.image_tag.as_deref().filter(|t| !t.is_empty()) {
        errors.check("imageTag", validate_image_tag(tag));
    }
    errors.labels(&request.labels);
    errors.config(&request.config);

    errors.into_result()
}

/// Pod labels that select the operator deployment and cannot change
pub const SELECTOR_LABEL_KEYS: [&str; 2] = [LABEL_NAME, LABEL_INSTANCE];

/// Validate an update request, reporting every offending field
pub fn validate_update_request(request: &UpdateCustomerRequest) -> Result<(), Vec<FieldError>> {
    let mut errors = FieldErrors::default();

    if let Some(tag) = request.image_tag.as_deref().filter(|t| !t.is_empty()) {
        errors.check("imageTag", validate_image_tag(tag));
    }
    if let Some(labels) = &request.labels {
        errors.labels(labels);
        for key in labels.keys().filter(|k| SELECTOR_LABEL_KEYS.contains(&k.as_str())) {
            errors.0.push(FieldError {
                field: format!("labels.{}", key),
                message: format!("Label '{}' selects the operator pods and cannot be changed", key),
            });
        }
    }
    if let Some(config) = &request.config {
        errors.config(config);
    }

    errors.into_result()
}
