use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CourierId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierLocation {
    pub courier_id: CourierId,
    pub location: GeoPoint,
    pub updated_at: DateTime<Utc>,
}
