use std::collections::HashMap;
use std::sync::Arc;

use crate::driver::EndpointDriver;
use crate::error::UnknownEndpoint;

/// Resolves `endpointType` to a driver instance. Built once at startup;
/// immutable thereafter.
pub struct DriverSelector {
    drivers: HashMap<String, Arc<dyn EndpointDriver>>,
}

impl DriverSelector {
    pub fn new(drivers: HashMap<String, Arc<dyn EndpointDriver>>) -> Self {
        DriverSelector { drivers }
    }

    pub fn resolve(&self, endpoint_type: &str) -> Result<Arc<dyn EndpointDriver>, UnknownEndpoint> {
        self.drivers
            .get(endpoint_type)
            .cloned()
            .ok_or_else(|| UnknownEndpoint(endpoint_type.to_string()))
    }
}
