//! CSV writers for head series and pathlines.

use std::io::{self, Write};

use crate::math::Scalar;
use crate::trace::Trajectory;

/// Writes a CSV of head over time (one row per time).
pub fn write_head_series_csv<W: Write>(
    mut w: W,
    times: &[Scalar],
    heads: &[Scalar],
) -> io::Result<()> {
    writeln!(w, "time,head")?;
    for (time, head) in times.iter().zip(heads) {
        writeln!(w, "{:.16e},{:.16e}", time, head)?;
    }
    Ok(())
}

/// Writes a CSV of heads in every aquifer over time; `heads[k]` holds the
/// heads at `times[k]`.
pub fn write_layered_heads_csv<W: Write>(
    mut w: W,
    times: &[Scalar],
    heads: &[Vec<Scalar>],
) -> io::Result<()> {
    let columns = heads.iter().map(Vec::len).max().unwrap_or(0);
    write!(w, "time")?;
    for aquifer in 0..columns {
        write!(w, ",head_{aquifer}")?;
    }
    writeln!(w)?;
    for (time, row) in times.iter().zip(heads) {
        write!(w, "{:.16e}", time)?;
        for aquifer in 0..columns {
            // missing aquifers are padded so every row has the same width
            let h = row.get(aquifer).copied().unwrap_or(Scalar::NAN);
            write!(w, ",{:.16e}", h)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Writes a CSV of a pathline: position, time, layer, velocity and state per sample.
pub fn write_trajectory_csv<W: Write>(mut w: W, trajectory: &Trajectory) -> io::Result<()> {
    writeln!(w, "time,x,y,z,layer,vx,vy,vz,state")?;
    for point in &trajectory.points {
        writeln!(
            w,
            "{:.16e},{:.16e},{:.16e},{:.16e},{},{:.16e},{:.16e},{:.16e},{}",
            point.time,
            point.position.x,
            point.position.y,
            point.position.z,
            point.layer,
            point.velocity.x,
            point.velocity.y,
            point.velocity.z,
            point.state
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::R3;
    use crate::trace::{StopReason, TracePoint, TraceState};

    #[test]
    fn head_series_has_header_and_rows() {
        let mut out = Vec::new();
        write_head_series_csv(&mut out, &[1.0, 2.0], &[-0.5, -0.75]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "time,head");
        assert!(lines[2].starts_with("2.0000000000000000e0,"));
    }

    #[test]
    fn layered_heads_pad_short_rows() {
        let mut out = Vec::new();
        write_layered_heads_csv(&mut out, &[1.0, 2.0], &[vec![1.0, 2.0], vec![3.0]]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("time,head_0,head_1\n"));
        assert!(text.lines().nth(2).unwrap().ends_with("NaN"));
    }

    #[test]
    fn trajectory_rows_carry_state() {
        let point = |t: Scalar, state| TracePoint {
            position: R3::new(t, 0.0, -1.0),
            time: t,
            layer: 0,
            velocity: R3::new(1.0, 0.0, 0.0),
            state,
        };
        let trajectory = Trajectory {
            points: vec![
                point(0.0, TraceState::Active),
                point(1.0, TraceState::Stopped(StopReason::EndTime)),
            ],
            stop: StopReason::EndTime,
        };
        let mut out = Vec::new();
        write_trajectory_csv(&mut out, &trajectory).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(1).unwrap().ends_with(",active"));
        assert!(text.lines().nth(2).unwrap().ends_with(",stopped:end_time"));
    }
}
