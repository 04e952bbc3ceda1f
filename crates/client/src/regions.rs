//! turbopuffer regions (<https://turbopuffer.com/docs/regions>)

pub const DEFAULT_REGION: &str = "aws-us-east-1";

pub const REGIONS: [&str; 14] = [
    // GCP
    "gcp-us-central1",
    "gcp-us-west1",
    "gcp-us-east4",
    "gcp-northamerica-northeast2",
    "gcp-europe-west3",
    "gcp-asia-southeast1",
    "gcp-asia-northeast3",
    // AWS
    "aws-ap-southeast-2",
    "aws-eu-central-1",
    "aws-eu-west-1",
    "aws-us-east-1",
    "aws-us-east-2",
    "aws-us-west-2",
    "aws-ap-south-1",
];

pub fn is_valid_region(region: &str) -> bool {
    REGIONS.contains(&region)
}

pub fn api_base_url(region: &str) -> String {
    format!("https://{region}.turbopuffer.com")
}
