use apptp::AppTrackerSighting;
use mockall::mock;
use rstest::fixture;

mock! {
    pub Detector {}

    impl apptp::AppTrackerDetector for Detector {
        fn evaluate(&self, domain: &str, uid: i32) -> Option<AppTrackerSighting>;
    }
}

#[fixture]
pub fn mock_detector() -> MockDetector {
    MockDetector::new()
}
