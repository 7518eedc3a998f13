//! CSV export of rendered output frames.

use std::io::Write;

use cv_engine::OutputFrame;
use cv_ir::TickRate;

/// One row per tick: elapsed seconds, then the four output voltages.
pub fn write_csv(
    w: &mut impl Write,
    frames: &[OutputFrame],
    rate: TickRate,
) -> std::io::Result<()> {
    writeln!(w, "time,out1,out2,out3,out4")?;
    for (tick, frame) in frames.iter().enumerate() {
        let [a, b, c, d] = frame.volts;
        writeln!(w, "{:.6},{a:.6},{b:.6},{c:.6},{d:.6}", rate.ticks_to_seconds(tick as u32))?;
    }
    Ok(())
}

pub fn frames_to_csv(frames: &[OutputFrame], rate: TickRate) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_csv(&mut buf, frames, rate);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_rows() {
        let mut frame = OutputFrame::zero();
        frame.volts[0] = 1.0;
        frame.volts[3] = -2.5;
        let text = frames_to_csv(&[OutputFrame::zero(), frame], TickRate::new(1000).unwrap());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "time,out1,out2,out3,out4");
        assert_eq!(lines[1], "0.000000,0.000000,0.000000,0.000000,0.000000");
        assert_eq!(lines[2], "0.001000,1.000000,0.000000,0.000000,-2.500000");
    }
}
