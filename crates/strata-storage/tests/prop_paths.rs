use proptest::prelude::*;
use strata_render::TileCoord;
use strata_storage::FileTileStorage;

fn tile() -> impl Strategy<Value = TileCoord> {
    (-2000i32..2000, -2000i32..2000, 0u8..6).prop_map(|(x, z, lod)| TileCoord::new(x, z, lod))
}

proptest! {
    // Distinct tiles never share a file
    #[test]
    fn tile_paths_are_injective(a in tile(), b in tile()) {
        let store = FileTileStorage::new("/tiles", false);
        prop_assert_eq!(a == b, store.tile_path(a) == store.tile_path(b));
    }

    #[test]
    fn tile_paths_stay_under_root(t in tile()) {
        let store = FileTileStorage::new("/tiles", false);
        let p = store.tile_path(t);
        prop_assert!(p.starts_with("/tiles"));
        prop_assert_eq!(p.extension().and_then(|e| e.to_str()), Some("tile"));
    }
}
