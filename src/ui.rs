use std::io::{self, Stdout, Write};

use anyhow::{Context, Result};

use crate::render::{Frame, FrameSink};

const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

/// Top-down text view of the floor: north is up, east is right.
pub(crate) struct TerminalSurface<W: Write> {
    out: W,
    width: usize,
    height: usize,
    clear: bool,
}

impl TerminalSurface<Stdout> {
    pub(crate) fn stdout(width: usize, height: usize) -> Self {
        TerminalSurface {
            clear: true,
            ..TerminalSurface::new(io::stdout(), width, height)
        }
    }
}

impl<W: Write> TerminalSurface<W> {
    pub(crate) fn new(out: W, width: usize, height: usize) -> Self {
        TerminalSurface {
            out,
            width,
            height,
            clear: false,
        }
    }

    fn cell(&self, x: f64, z: f64, bound: f64) -> (usize, usize) {
        let scale = |value: f64, cells: usize| {
            let unit = ((value + bound) / (2.0 * bound)).clamp(0.0, 1.0);
            (unit * cells.saturating_sub(1) as f64).round() as usize
        };
        (scale(x, self.width), scale(z, self.height))
    }

    pub(crate) fn compose(&self, frame: &Frame) -> String {
        let world = &frame.world;
        let agent = self.cell(world.agent.x, world.agent.z, world.bound);
        let target = self.cell(world.target.x, world.target.z, world.bound);

        let mut out = String::with_capacity((self.width + 1) * (self.height + 1) + 80);
        for row in 0..self.height {
            for col in 0..self.width {
                let here = (col, row);
                out.push(match (here == agent, here == target) {
                    (true, true) => '*',
                    (true, false) => '@',
                    (false, true) => 'X',
                    (false, false) => '.',
                });
            }
            out.push('\n');
        }

        let run = frame.run_id.simple().to_string();
        out.push_str(&format!(
            "run {} | episode {} | step {} | state {} | distance {:.2}\n",
            &run[..8],
            frame.episode,
            frame.step,
            world.state,
            world.distance()
        ));
        out
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameSink for TerminalSurface<W> {
    fn draw(&mut self, frame: &Frame) -> Result<()> {
        let picture = self.compose(frame);
        if self.clear {
            self.out.write_all(CLEAR_SCREEN.as_bytes())?;
        }
        self.out
            .write_all(picture.as_bytes())
            .and_then(|_| self.out.flush())
            .context("failed to draw frame")
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;
    use uuid::Uuid;

    use super::*;
    use crate::engine::{StateKey, WorldSnapshot, BOUND, VISUAL_OFFSET};

    fn frame(agent: (f64, f64), target: (f64, f64)) -> Frame {
        let agent = DVec3::new(agent.0, VISUAL_OFFSET, agent.1);
        Frame {
            run_id: Uuid::nil(),
            episode: 3,
            step: 12,
            world: WorldSnapshot {
                agent,
                target: DVec3::new(target.0, VISUAL_OFFSET, target.1),
                state: StateKey::from_position(agent),
                bound: BOUND,
            },
        }
    }

    #[test]
    fn one_cell_per_lattice_point() {
        let surface = TerminalSurface::new(Vec::new(), 21, 21);
        let picture = surface.compose(&frame((0.0, 0.0), (-10.0, 10.0)));
        let rows = picture.lines().collect::<Vec<_>>();
        assert_eq!(rows.len(), 22);
        assert_eq!(rows[10].chars().nth(10), Some('@'));
        assert_eq!(rows[20].chars().next(), Some('X'));
        assert_eq!(rows[0], ".".repeat(21));
        assert_eq!(
            rows[21],
            "run 00000000 | episode 3 | step 12 | state 0,0 | distance 14.14"
        );
    }

    #[test]
    fn overlap_is_marked() {
        let surface = TerminalSurface::new(Vec::new(), 21, 21);
        let picture = surface.compose(&frame((4.0, -3.0), (4.0, -3.0)));
        let rows = picture.lines().collect::<Vec<_>>();
        assert_eq!(rows[7].chars().nth(14), Some('*'));
        assert!(!picture.contains('@') && !picture.contains('X'));
    }

    #[test]
    fn small_surfaces_scale_the_floor() {
        let surface = TerminalSurface::new(Vec::new(), 5, 3);
        let picture = surface.compose(&frame((10.0, -10.0), (-10.0, 10.0)));
        let rows = picture.lines().take(3).collect::<Vec<_>>();
        assert_eq!(rows, vec!["....@", ".....", "X...."]);
    }

    #[test]
    fn empty_surface_draws_only_the_status_line() {
        for (width, height) in [(0, 0), (0, 4), (4, 0)] {
            let surface = TerminalSurface::new(Vec::new(), width, height);
            let picture = surface.compose(&frame((3.0, 2.0), (-1.0, 5.0)));
            let rows = picture.lines().collect::<Vec<_>>();
            assert_eq!(rows.len(), height + 1);
            assert!(rows.last().unwrap().starts_with("run 00000000"));
        }
    }

    #[test]
    fn draw_writes_picture_without_clearing() {
        let mut surface = TerminalSurface::new(Vec::new(), 3, 3);
        let frame = frame((0.0, 0.0), (10.0, 10.0));
        surface.draw(&frame).unwrap();
        let expected = surface.compose(&frame);
        let written = String::from_utf8(surface.into_inner()).unwrap();
        assert_eq!(written, expected);
        assert!(written.starts_with("...\n.@.\n..X\n"));
    }
}
