//! Match profile generation

use crate::types::MatchProfile;

/// One profile per region, each drawing from a pool of the same name
///
/// Built once at startup; the director never mutates the list.
pub fn generate_profiles(regions: &[String]) -> Vec<MatchProfile> {
    regions
        .iter()
        .map(|region| MatchProfile::for_region(region))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_per_region() {
        let regions = vec![
            "us-central1".to_string(),
            "europe-west1".to_string(),
            "asia-east1".to_string(),
        ];
        let profiles = generate_profiles(&regions);

        assert_eq!(profiles.len(), 3);
        for (profile, region) in profiles.iter().zip(&regions) {
            assert_eq!(&profile.name, region);
            assert_eq!(profile.pools.len(), 1);
            assert_eq!(&profile.pools[0].name, region);
        }
    }

    #[test]
    fn test_no_regions_no_profiles() {
        assert!(generate_profiles(&[]).is_empty());
    }
}
