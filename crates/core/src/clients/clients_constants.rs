use std::time::Duration;

/// How long a refreshed self-reported table stays fresh.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Checklist fields every onboarding form is expected to fill.
pub const REQUIRED_FIELDS: [&str; 10] = [
    "client_name",
    "contact_person",
    "email",
    "phone",
    "company_size",
    "industry",
    "service_scope",
    "budget_range",
    "timeline",
    "target_audience",
];

/// Checklist fields that add insight but are not mandatory.
pub const OPTIONAL_FIELDS: [&str; 11] = [
    "website_url",
    "target_occupation",
    "top_services",
    "customer_learning_points",
    "customer_questions",
    "education_topics",
    "keywords",
    "customer_fears",
    "customer_pain_points",
    "customer_problems",
    "customer_desires",
];

/// Column names whose canonical field name is not plain camelCase.
pub const FIELD_ALIASES: [(&str, &str); 3] = [
    ("client_name", "name"),
    ("website_url", "website"),
    ("clientName", "name"),
];

/// Columns owned by the collection itself, never copied into view fields.
pub const BOOKKEEPING_COLUMNS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Serialized names of view and merged-view members. Columns that map onto
/// one of these are dropped so the flattened fields never repeat a key.
pub const RESERVED_FIELDS: [&str; 8] = [
    "tier",
    "id",
    "createdAt",
    "updatedAt",
    "dataSource",
    "hasHighestTierData",
    "tierDate",
    "completenessPercent",
];
