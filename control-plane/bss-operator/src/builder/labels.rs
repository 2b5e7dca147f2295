use std::collections::BTreeMap;

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_VERSION: &str = "app.kubernetes.io/version";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

pub const APP_NAME: &str = "bss-cluster";
pub const OPERATOR_NAME: &str = "bss-operator";

/// Label selector matching every child this operator manages.
pub fn managed_by_selector() -> String {
    format!("{LABEL_MANAGED_BY}={OPERATOR_NAME}")
}

/// Immutable subset used in workload and service selectors.
pub fn selector_labels(instance: &str) -> BTreeMap<String, String> {
    let mut lbls = BTreeMap::new();
    lbls.insert(LABEL_NAME.to_string(), APP_NAME.to_string());
    lbls.insert(LABEL_INSTANCE.to_string(), instance.to_string());
    lbls
}

pub fn common_labels(
    instance: &str,
    version: Option<&str>,
) -> BTreeMap<String, String> {
    let mut lbls = selector_labels(instance);
    lbls.insert(LABEL_PART_OF.to_string(), OPERATOR_NAME.to_string());
    lbls.insert(LABEL_MANAGED_BY.to_string(), OPERATOR_NAME.to_string());
    if let Some(v) = version.filter(|v| !v.is_empty()) {
        lbls.insert(LABEL_VERSION.to_string(), v.to_string());
    }
    lbls
}
