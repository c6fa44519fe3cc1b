use crate::wire::HealthRes;

/// Health check shared by the REST server and the CLI.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Report that the service is up.
    ///
    /// The check is static: collaborators are not contacted, so a reachable process is
    /// considered healthy.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Summary service is alive".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_healthy() {
        let res = HealthService::check_health();
        assert!(res.ok);
        assert!(res.message.contains("alive"));
    }
}
