use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        HandoffError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        HandoffError::context_lost("x")
            .to_string()
            .contains("gpu context lost:")
    );
    assert!(
        HandoffError::allocation("x")
            .to_string()
            .contains("allocation error:")
    );
    assert!(
        HandoffError::contract("x")
            .to_string()
            .contains("contract violation:")
    );
    assert!(
        HandoffError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = HandoffError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn gpu_failures_are_classified() {
    assert!(HandoffError::context_lost("reset").is_gpu_failure());
    assert!(HandoffError::allocation("oom").is_gpu_failure());
    assert!(!HandoffError::validation("size").is_gpu_failure());
    assert!(!HandoffError::contract("thread").is_gpu_failure());
}
