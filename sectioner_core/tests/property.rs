use proptest::prelude::*;
use sectioner_core::StagePositionUser;
use sectioner_core::units::{encoder_to_user, normalize_r_deg, user_to_encoder};

prop_compose! {
    fn position_strategy()(
        x in -300.0f64..300.0,
        y in -300.0f64..300.0,
        z in -300.0f64..300.0,
        r in -180.0f64..180.0,
        t in -90.0f64..90.0,
    ) -> StagePositionUser {
        StagePositionUser::raw(x, y, z, r, t)
    }
}

proptest! {
    #[test]
    fn user_encoder_round_trip(pos in position_strategy()) {
        let back = encoder_to_user(&user_to_encoder(&pos));
        prop_assert!((back.x_mm - pos.x_mm).abs() < 1e-9);
        prop_assert!((back.y_mm - pos.y_mm).abs() < 1e-9);
        prop_assert!((back.z_mm - pos.z_mm).abs() < 1e-9);
        prop_assert!((back.r_deg - pos.r_deg).abs() < 1e-9);
        prop_assert!((back.t_deg - pos.t_deg).abs() < 1e-9);
        prop_assert_eq!(back.coordinate_system, pos.coordinate_system);
    }

    #[test]
    fn normalized_rotation_stays_canonical(r in -3600.0f64..3600.0) {
        let n = normalize_r_deg(r);
        prop_assert!((-180.0..180.0).contains(&n), "normalize({r}) gave {n}");
    }

    #[test]
    fn full_turns_collapse(r in -170.0f64..170.0) {
        prop_assert!((normalize_r_deg(r + 360.0) - r).abs() < 1e-9);
        prop_assert!((normalize_r_deg(r - 360.0) - r).abs() < 1e-9);
    }
}
