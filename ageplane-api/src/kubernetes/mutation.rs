//! Partial updates of a customer workload

use ageplane_common::UpdateCustomerRequest;
use k8s_openapi::api::apps::v1::Deployment;

/// Replace the tag of an image reference, keeping repository and registry
///
/// A trailing `:port/...` segment is part of the repository, not a tag.
pub fn retag_image(image: &str, tag: &str) -> String {
    let base = match image.rsplit_once(':') {
        Some((base, tail)) if !tail.contains('/') => base,
        _ => image,
    };
    format!("{}:{}", base, tag)
}

/// Apply an update request to a deployment in place
///
/// Only the image tag of `container_name` and the pod template labels are
/// touched. Labels used by the deployment's selector are left alone. Returns
/// whether anything changed.
pub fn apply_update(
    deployment: &mut Deployment,
    update: &UpdateCustomerRequest,
    container_name: &str,
) -> bool {
    let Some(spec) = deployment.spec.as_mut() else {
        return false;
    };
    let mut changed = false;

    if let Some(tag) = update.image_tag.as_deref().filter(|t| !t.is_empty()) {
        let containers = spec
            .template
            .spec
            .iter_mut()
            .flat_map(|pod| pod.containers.iter_mut())
            .filter(|c| c.name == container_name);

        for container in containers {
            let current = container.image.clone().unwrap_or_default();
            let image = retag_image(&current, tag);
            if current != image {
                container.image = Some(image);
                changed = true;
            }
        }
    }

    if let Some(labels) = update.labels.as_ref().filter(|l| !l.is_empty()) {
        let selector = spec.selector.match_labels.clone().unwrap_or_default();
        let template_labels = spec
            .template
            .metadata
            .get_or_insert_with(Default::default)
            .labels
            .get_or_insert_with(Default::default);

        for (key, value) in labels.iter().filter(|(key, _)| !selector.contains_key(*key)) {
            if template_labels.get(key) != Some(value) {
                template_labels.insert(key.clone(), value.clone());
                changed = true;
            }
        }
    }

    changed
}
