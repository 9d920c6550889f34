use dr_proto::FixedLayout;

/// Spacing between adjacent antennas in the default spiral layout, in
/// meters. Chosen to keep every baseline within the imager's 250 m
/// selection window (spec §4.8) for a few dozen stands.
const SPACING_M: f64 = 15.0;

/// Builds a concrete `AntennaLayout` (spec §1 "physics helpers... antenna
/// tables" is an external collaborator; this is the in-memory stand-in
/// that drives uvw geometry end to end). Arranges `nstand` antennas on an
/// expanding spiral so that baseline lengths span a realistic range
/// instead of all lying on a single line.
pub fn default_layout(nstand: u32) -> FixedLayout {
    let mut positions = Vec::with_capacity(nstand as usize);
    for i in 0..nstand {
        let angle = f64::from(i) * 2.399_963_229_728_653; // golden angle, radians
        let radius = SPACING_M * f64::from(i).sqrt();
        positions.push([radius * angle.cos(), radius * angle.sin(), 0.0]);
    }
    FixedLayout::new(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_proto::AntennaLayout;

    #[test]
    fn builds_exactly_nstand_positions() {
        let layout = default_layout(48);
        assert_eq!(layout.nstand(), 48);
    }

    #[test]
    fn first_antenna_sits_at_the_origin() {
        let layout = default_layout(4);
        assert_eq!(layout.position(0), [0.0, 0.0, 0.0]);
    }
}
