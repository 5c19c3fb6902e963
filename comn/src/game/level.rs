use serde::{Deserialize, Serialize};

use crate::{
    geom::{self, AaRect, Ray},
    Point, Vector,
};

pub const SURROUNDINGS_LEN: usize = 9;

/// Walls are one unit larger than a grid cell so that neighbouring walls
/// overlap instead of leaving seams.
pub const WALL_OVERLAP: f32 = 1.0;

const BUILTIN_LEVELS: &[&[&str]] = &[
    &[
        ".......W......",
        "...WWW.WW.....",
        ".....W.......B",
        "..P..WWWW....B",
        "...W...W.....B",
        "...W.WWWW.....",
        "...W..........",
    ],
    &[
        "*****W******",
        "*****W******",
        "*****W***B**",
        "*****W******",
        "P****W******",
        "************",
        "************",
        "************",
    ],
    &[
        "*****W******",
        "P****W**B***",
        "*****W******",
        "*****W******",
        "************",
        "*****W******",
        "P****W**B***",
        "*****W******",
    ],
    &[
        "*****W******",
        "P****W**BB**",
        "*****W**BB**",
        "**W**WWW****",
        "**W*********",
        "**WWWW**BB**",
        "P****W**BB**",
        "**W**W******",
    ],
    &[
        "******W**************",
        "******W*****W*****B**",
        "*P****W*****W********",
        "*****WW*****WWW***B**",
        "*********************",
        "*******WWW********B**",
        "*********W****W******",
        "************WWW***B**",
        "*****WWW****W********",
        "*****W************B**",
        "*****W*******WW******",
        "**************W***B**",
    ],
];

#[derive(Debug, Clone, PartialEq)]
pub enum LevelError {
    Empty,
    RaggedRow { row: usize },
    UnknownTile { row: usize, col: usize, tile: char },
    NoLevels,
    IndexOutOfRange(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    Empty,
    Wall,
    BotSpawn,
    PlayerSpawn,
}

impl Tile {
    pub fn from_char(c: char) -> Option<Tile> {
        match c {
            '.' | '*' => Some(Tile::Empty),
            'W' => Some(Tile::Wall),
            'B' => Some(Tile::BotSpawn),
            'P' => Some(Tile::PlayerSpawn),
            _ => None,
        }
    }
}

/// A hand-authored tile grid, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<Tile>>,
}

impl Grid {
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<Grid, LevelError> {
        let rows = lines
            .iter()
            .enumerate()
            .map(|(row, line)| {
                line.as_ref()
                    .trim()
                    .chars()
                    .enumerate()
                    .map(|(col, c)| {
                        Tile::from_char(c).ok_or(LevelError::UnknownTile { row, col, tile: c })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let cols = rows.first().map_or(0, |row| row.len());
        if cols == 0 {
            return Err(LevelError::Empty);
        }
        if let Some(row) = rows.iter().position(|row| row.len() != cols) {
            return Err(LevelError::RaggedRow { row });
        }

        Ok(Grid { rows })
    }

    pub fn cols(&self) -> usize {
        self.rows[0].len()
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn tile(&self, col: usize, row: usize) -> Option<Tile> {
        self.rows.get(row).and_then(|r| r.get(col)).copied()
    }
}

/// Parses grids separated by blank lines.
pub fn parse_levels(text: &str) -> Result<Vec<Grid>, LevelError> {
    let mut grids = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !lines.is_empty() {
                grids.push(Grid::parse(&lines)?);
                lines.clear();
            }
        } else {
            lines.push(line);
        }
    }
    if !lines.is_empty() {
        grids.push(Grid::parse(&lines)?);
    }

    if grids.is_empty() {
        Err(LevelError::NoLevels)
    } else {
        Ok(grids)
    }
}

pub fn builtin_grids() -> Result<Vec<Grid>, LevelError> {
    BUILTIN_LEVELS.iter().map(|lines| Grid::parse(lines)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pos: Point,
    width: f32,
    height: f32,
    min_x: f32,
    max_x: f32,
    min_y: f32,
    max_y: f32,
}

impl Wall {
    pub fn new(pos: Point, width: f32, height: f32) -> Self {
        debug_assert!(width >= 0.0 && height >= 0.0, "wall with negative extent");

        Self {
            pos,
            width,
            height,
            min_x: pos.x - width / 2.0,
            max_x: pos.x + width / 2.0,
            min_y: pos.y - height / 2.0,
            max_y: pos.y + height / 2.0,
        }
    }

    pub fn pos(&self) -> Point {
        self.pos
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn min_x(&self) -> f32 {
        self.min_x
    }

    pub fn max_x(&self) -> f32 {
        self.max_x
    }

    pub fn min_y(&self) -> f32 {
        self.min_y
    }

    pub fn max_y(&self) -> f32 {
        self.max_y
    }

    pub fn aa_rect(&self) -> AaRect {
        AaRect::new_center(self.pos, Vector::new(self.width, self.height))
    }

    pub fn contains_point(&self, point: Point) -> bool {
        geom::in_bound(point.x, self.min_x, self.max_x)
            && geom::in_bound(point.y, self.min_y, self.max_y)
    }
}

/// The ordered list of grids plus the walls and spawn points of the current
/// one.
#[derive(Debug, Clone)]
pub struct Level {
    grids: Vec<Grid>,
    current: usize,
    canvas: Vector,
    walls: Vec<Wall>,
    player_spawns: Vec<Point>,
    bot_spawns: Vec<Point>,
}

impl Level {
    pub fn new(grids: Vec<Grid>, canvas: Vector) -> Result<Level, LevelError> {
        if grids.is_empty() {
            return Err(LevelError::NoLevels);
        }

        let mut level = Level {
            grids,
            current: 0,
            canvas,
            walls: Vec::new(),
            player_spawns: Vec::new(),
            bot_spawns: Vec::new(),
        };
        level.build();

        Ok(level)
    }

    pub fn builtin(canvas: Vector) -> Result<Level, LevelError> {
        Level::new(builtin_grids()?, canvas)
    }

    pub fn num_levels(&self) -> usize {
        self.grids.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Switches to the next grid, wrapping around after the last one.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.grids.len();
        self.build();
    }

    pub fn make_level(&mut self, index: usize) -> Result<(), LevelError> {
        if index >= self.grids.len() {
            return Err(LevelError::IndexOutOfRange(index));
        }

        self.current = index;
        self.build();

        Ok(())
    }

    fn build(&mut self) {
        self.walls.clear();
        self.player_spawns.clear();
        self.bot_spawns.clear();

        let cell = self.cell_size();

        for row in 0..self.grid().rows() {
            for col in 0..self.grid().cols() {
                let center = self.grid_to_world(col, row);

                match self.grid().tile(col, row) {
                    Some(Tile::Wall) => self.walls.push(Wall::new(
                        center,
                        cell.x + WALL_OVERLAP,
                        cell.y + WALL_OVERLAP,
                    )),
                    Some(Tile::BotSpawn) => self.bot_spawns.push(center),
                    Some(Tile::PlayerSpawn) => self.player_spawns.push(center),
                    _ => (),
                }
            }
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grids[self.current]
    }

    pub fn canvas(&self) -> Vector {
        self.canvas
    }

    /// (cols, rows) of the current grid.
    pub fn level_size(&self) -> (usize, usize) {
        (self.grid().cols(), self.grid().rows())
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn player_spawns(&self) -> &[Point] {
        &self.player_spawns
    }

    pub fn bot_spawns(&self) -> &[Point] {
        &self.bot_spawns
    }

    pub fn cell_size(&self) -> Vector {
        let (cols, rows) = self.level_size();
        Vector::new(self.canvas.x / cols as f32, self.canvas.y / rows as f32)
    }

    /// Center of a grid cell in world coordinates.
    pub fn grid_to_world(&self, col: usize, row: usize) -> Point {
        let cell = self.cell_size();
        Point::new(
            cell.x * (col as f32 + 0.5),
            cell.y * (row as f32 + 0.5),
        )
    }

    /// Unclamped grid coordinates; may lie outside the grid.
    pub fn coordinates_from_position(&self, pos: Point) -> (i64, i64) {
        let (cols, rows) = self.level_size();
        let x = (pos.x / self.canvas.x * cols as f32).ceil() as i64 - 1;
        let y = (pos.y / self.canvas.y * rows as f32).ceil() as i64 - 1;
        (x, y)
    }

    /// Grid cell containing `pos`, clamped to the grid.
    pub fn world_to_grid(&self, pos: Point) -> (usize, usize) {
        let (cols, rows) = self.level_size();
        let (x, y) = self.coordinates_from_position(pos);
        (
            x.max(0).min(cols as i64 - 1) as usize,
            y.max(0).min(rows as i64 - 1) as usize,
        )
    }

    pub fn coordinates_normalized(&self, pos: Point) -> Vector {
        Vector::new(pos.x / self.canvas.x, pos.y / self.canvas.y)
    }

    /// Cells outside of the grid count as walls.
    pub fn is_position_in_wall(&self, coords: (i64, i64)) -> bool {
        let (cols, rows) = self.level_size();
        let (x, y) = coords;

        if x < 0 || y < 0 || x >= cols as i64 || y >= rows as i64 {
            true
        } else {
            self.grid().tile(x as usize, y as usize) == Some(Tile::Wall)
        }
    }

    pub fn is_point_in_wall(&self, pos: Point) -> bool {
        let outside = pos.x < 0.0 || pos.y < 0.0 || pos.x > self.canvas.x || pos.y > self.canvas.y;
        outside || self.is_position_in_wall(self.coordinates_from_position_clamped_low(pos))
    }

    // Points exactly on the top/left edge map to cell -1 under the ceil rule;
    // they belong to the first cell.
    fn coordinates_from_position_clamped_low(&self, pos: Point) -> (i64, i64) {
        let (x, y) = self.coordinates_from_position(pos);
        (x.max(0), y.max(0))
    }

    /// 3x3 window around the cell containing `pos`, row-major, with 1 for
    /// walls or cells outside of the grid and 0 for open cells.
    pub fn surroundings(&self, pos: Point) -> [u8; SURROUNDINGS_LEN] {
        let (x, y) = self.world_to_grid(pos);
        let (x, y) = (x as i64, y as i64);
        let mut result = [0; SURROUNDINGS_LEN];

        for (i, dy) in (-1..=1).enumerate() {
            for (j, dx) in (-1..=1).enumerate() {
                if self.is_position_in_wall((x + dx, y + dy)) {
                    result[i * 3 + j] = 1;
                }
            }
        }

        result
    }

    /// Flattened grid with 0 for empty cells, 1 for the player, 2 for the bot
    /// and 3 for walls. Empty if either cell lies outside of the grid.
    pub fn current_map(&self, player: (i64, i64), bot: (i64, i64)) -> Vec<u8> {
        let (cols, rows) = self.level_size();
        let inside = |(x, y): (i64, i64)| x >= 0 && y >= 0 && x < cols as i64 && y < rows as i64;

        if !inside(player) || !inside(bot) {
            return Vec::new();
        }

        let mut map = vec![0; cols * rows];
        for row in 0..rows {
            for col in 0..cols {
                let index = row * cols + col;
                let cell = (col as i64, row as i64);

                if cell == player {
                    map[index] = 1;
                }
                if cell == bot {
                    map[index] = 2;
                }
                if self.grid().tile(col, row) == Some(Tile::Wall) {
                    map[index] = 3;
                }
            }
        }

        map
    }

    /// True if no wall blocks the turret ray from `origin` before it reaches
    /// the distance of `target`.
    pub fn is_reachable(&self, origin: Point, turret_angle: f32, target: Point) -> bool {
        let ray = Ray {
            origin,
            dir: geom::from_polar(1.0, turret_angle),
        };
        let target_t = geom::distance(origin, target);

        !self.walls.iter().any(|wall| {
            ray.intersections(&wall.aa_rect())
                .first()
                .map_or(false, |t| t <= target_t)
        })
    }
}
