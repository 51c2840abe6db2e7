//! Mesh coordinates and port directions.
//!
//! Tiles live on a rectangular grid of `dim_x` columns by `dim_y` rows.
//! A tile is addressed either by its `(x, y)` coordinate or by its flat
//! node id `y * dim_x + x`; the two forms are interchangeable.
//!
//! Each router has five ports: the four cardinal neighbors plus the
//! local port that connects the processing element.

/// Flat tile identifier, `y * dim_x + x`.
pub type NodeId = usize;

/// Number of external (cardinal) ports per router.
pub const DIRECTIONS: usize = 4;

/// Total ports per router, including the local PE port.
pub const PORTS: usize = DIRECTIONS + 1;

/// A router port direction.
///
/// The discriminants double as port indices; the cardinal directions
/// come first so `0..DIRECTIONS` iterates exactly the external ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Direction {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
    Local = 4,
}

impl Direction {
    /// All five port directions in index order.
    pub const ALL: [Direction; PORTS] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Local,
    ];

    /// The four external directions in index order.
    pub const CARDINALS: [Direction; DIRECTIONS] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Port index of this direction.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Direction for a port index.
    ///
    /// Panics on indices outside `0..PORTS`.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index]
    }

    /// The direction a neighbor uses for the shared link.
    ///
    /// North and South are each other's reflex, as are East and West.
    /// Local is its own reflex.
    pub fn reflex(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::Local => Direction::Local,
        }
    }

    /// True for the four cardinal directions.
    #[inline]
    pub fn is_cardinal(self) -> bool {
        self != Direction::Local
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
            Direction::Local => "local",
        };
        write!(f, "{name}")
    }
}

/// A tile position on the grid.
///
/// `x` grows eastward, `y` grows southward; `(0, 0)` is the north-west
/// corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coord {
    pub x: u16,
    pub y: u16,
}

impl Coord {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Mesh dimensions plus the id/coordinate conversions they induce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    dim_x: u16,
    dim_y: u16,
}

impl Topology {
    pub fn new(dim_x: u16, dim_y: u16) -> Self {
        Self { dim_x, dim_y }
    }

    #[inline]
    pub fn dim_x(&self) -> u16 {
        self.dim_x
    }

    #[inline]
    pub fn dim_y(&self) -> u16 {
        self.dim_y
    }

    /// Number of tiles in the mesh.
    #[inline]
    pub fn num_tiles(&self) -> usize {
        self.dim_x as usize * self.dim_y as usize
    }

    /// Coordinate of a node id.
    #[inline]
    pub fn coord_of(&self, id: NodeId) -> Coord {
        debug_assert!(id < self.num_tiles());
        Coord {
            x: (id % self.dim_x as usize) as u16,
            y: (id / self.dim_x as usize) as u16,
        }
    }

    /// Node id of a coordinate.
    #[inline]
    pub fn id_of(&self, coord: Coord) -> NodeId {
        debug_assert!(coord.x < self.dim_x && coord.y < self.dim_y);
        coord.y as usize * self.dim_x as usize + coord.x as usize
    }

    /// Id of the neighbor one hop away, or None at the mesh border.
    pub fn neighbor(&self, id: NodeId, direction: Direction) -> Option<NodeId> {
        let c = self.coord_of(id);
        let neighbor = match direction {
            Direction::North if c.y > 0 => Coord::new(c.x, c.y - 1),
            Direction::South if c.y + 1 < self.dim_y => Coord::new(c.x, c.y + 1),
            Direction::East if c.x + 1 < self.dim_x => Coord::new(c.x + 1, c.y),
            Direction::West if c.x > 0 => Coord::new(c.x - 1, c.y),
            _ => return None,
        };
        Some(self.id_of(neighbor))
    }

    /// Iterate all node ids in id order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        0..self.num_tiles()
    }
}
