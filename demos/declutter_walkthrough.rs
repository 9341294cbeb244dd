//! Walkthrough of zoom profiles and marker decluttering.
//!
//! Run with: cargo run --example declutter_walkthrough

use hotspot_engine::geo_math::distance_miles;
use hotspot_engine::{
    declutter, zoom_profile, Coordinate, EnrichedHotspot, Hotspot, MIN_DISCOVERY_ZOOM,
};

fn main() {
    // Midtown Manhattan viewport
    let center = Coordinate::new(40.7580, -73.9855);

    // A dense block of cafes plus a few spots further out
    let spots = [
        ("Blue Door Cafe", 40.75800, -73.98550),
        ("Corner Espresso", 40.75815, -73.98545), // a few doors down
        ("Roast Lab", 40.75795, -73.98565),       // across the street
        ("Park Kiosk", 40.76120, -73.98210),      // ~0.3 mi northeast
        ("Library Cafe", 40.75310, -73.98930),    // ~0.4 mi southwest
        ("Uptown Roasters", 40.77650, -73.97800), // ~1.3 mi north
    ];

    println!("Declutter Walkthrough\n");
    println!(
        "Viewport center: ({}, {}), {} candidate spots\n",
        center.latitude,
        center.longitude,
        spots.len()
    );

    for (step, zoom) in [13.5, 14.5, 16.0, 18.0].into_iter().enumerate() {
        println!("{}. Zoom {zoom}:", step + 1);

        if zoom < MIN_DISCOVERY_ZOOM {
            println!("   Below the discovery floor ({MIN_DISCOVERY_ZOOM}); nothing renders\n");
            continue;
        }

        let profile = zoom_profile(zoom);
        println!(
            "   Profile: radius {} mi, min separation {} mi",
            profile.radius_miles, profile.separation_miles
        );

        // Candidates inside the profile radius, nearest first, the same
        // priority order the viewport controller uses.
        let mut candidates: Vec<EnrichedHotspot> = spots
            .iter()
            .filter_map(|(name, lat, lon)| {
                let hotspot = Hotspot::new(*name, "cafe", Coordinate::new(*lat, *lon));
                let distance = distance_miles(&center, &hotspot.location);
                (distance <= profile.radius_miles)
                    .then(|| EnrichedHotspot::new(hotspot, distance, distance))
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.distance_from_user_miles
                .total_cmp(&b.distance_from_user_miles)
        });

        let rendered = declutter(candidates.clone(), profile.separation_miles);
        println!(
            "   {} candidates in radius, {} rendered after declutter:",
            candidates.len(),
            rendered.len()
        );
        for marker in &rendered {
            println!(
                "     - {} ({:.3} mi)",
                marker.hotspot.name, marker.distance_from_center_miles
            );
        }
        println!();
    }

    println!("Zoomed out, the wide radius pulls in every spot but the tight block");
    println!("collapses to its nearest member; zoomed in, the separation shrinks");
    println!("until every cafe on the block renders on its own.");
}
