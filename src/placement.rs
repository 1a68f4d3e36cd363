use std::{fmt, str::FromStr};

use crate::{
    block::{Block, Directory},
    error::ParseStrategyError,
    list::{Link, Node},
};

/// Policy used to pick the free block that serves a request. It's chosen once
/// when the allocator is initialized.
///
/// Given free blocks of 500, 50 and 300 bytes (in address order) and a request
/// of 40 bytes:
///
/// ```text
///             +-----+   +----+   +-----+
///             | 500 |   | 50 |   | 300 |
///             +-----+   +----+   +-----+
/// FirstFit       ^
/// BestFit                  ^
/// WorstFit       ^
/// ```
///
/// Ties are always resolved in favour of the lowest address (the block that
/// comes first in the directory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// First free block big enough.
    #[default]
    FirstFit,
    /// Smallest free block big enough.
    BestFit,
    /// Biggest free block big enough.
    WorstFit,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::FirstFit, Strategy::BestFit, Strategy::WorstFit];

    /// Returns the free block of the `directory` that this strategy would use
    /// to allocate `size` bytes, or `None` if no free block can hold them.
    pub(crate) fn find(self, directory: &Directory, size: usize) -> Link<Node<Block>> {
        let payload = |node: &Node<Block>| node.data.size;

        let mut candidates = directory.nodes().filter(|node| {
            let block = unsafe { &node.as_ref().data };
            block.is_free && block.size >= size
        });

        match self {
            Strategy::FirstFit => candidates.next(),
            // `min_by_key` keeps the first of equal elements, which is the
            // lowest address.
            Strategy::BestFit => candidates.min_by_key(|node| unsafe { payload(node.as_ref()) }),
            // `max_by_key` would keep the last one, so we only replace on strictly bigger.
            Strategy::WorstFit => candidates.reduce(|worst, node| unsafe {
                if payload(node.as_ref()) > payload(worst.as_ref()) { node } else { worst }
            }),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::FirstFit => "first-fit",
            Strategy::BestFit => "best-fit",
            Strategy::WorstFit => "worst-fit",
        };

        f.write_str(name)
    }
}

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "first-fit" | "first" => Ok(Strategy::FirstFit),
            "best-fit" | "best" => Ok(Strategy::BestFit),
            "worst-fit" | "worst" => Ok(Strategy::WorstFit),
            _ => Err(ParseStrategyError(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{mem, ptr::NonNull};

    use super::*;
    use crate::block::BLOCK_HEADER_SIZE;

    /// Backing memory for hand made directories. Only headers are written, so
    /// every block takes a single header sized slot no matter its `size`.
    struct Headers(Box<[u128; 64]>);

    impl Headers {
        fn new() -> Self {
            Self(Box::new([0; 64]))
        }

        fn slot(&mut self, index: usize) -> NonNull<u8> {
            let slots = BLOCK_HEADER_SIZE / mem::size_of::<u128>();
            NonNull::from(&mut self.0[index * slots]).cast()
        }
    }

    /// Builds a directory from `(size, is_free)` pairs in address order.
    fn directory(headers: &mut Headers, blocks: &[(usize, bool)]) -> (Directory, Vec<NonNull<Node<Block>>>) {
        let mut directory = Directory::new();
        let nodes = blocks
            .iter()
            .enumerate()
            .map(|(i, &(size, is_free))| unsafe {
                let block = Block { size, is_free, region: NonNull::dangling() };
                directory.append(block, headers.slot(i))
            })
            .collect();

        (directory, nodes)
    }

    #[test]
    fn each_strategy_picks_its_block() {
        let mut headers = Headers::new();
        let (directory, nodes) = directory(
            &mut headers,
            &[(512, true), (16, false), (64, true), (16, false), (304, true), (16, false)],
        );

        assert_eq!(Strategy::FirstFit.find(&directory, 48), Some(nodes[0]));
        assert_eq!(Strategy::BestFit.find(&directory, 48), Some(nodes[2]));
        assert_eq!(Strategy::WorstFit.find(&directory, 48), Some(nodes[0]));
    }

    #[test]
    fn used_blocks_are_skipped() {
        let mut headers = Headers::new();
        let (directory, nodes) = directory(&mut headers, &[(1024, false), (32, true), (128, true)]);

        for strategy in [Strategy::FirstFit, Strategy::BestFit] {
            assert_eq!(strategy.find(&directory, 32), Some(nodes[1]));
        }
        assert_eq!(Strategy::WorstFit.find(&directory, 32), Some(nodes[2]));
        assert_eq!(Strategy::FirstFit.find(&directory, 64), Some(nodes[2]));
    }

    #[test]
    fn ties_go_to_the_lowest_address() {
        let mut headers = Headers::new();
        let (directory, nodes) = directory(
            &mut headers,
            &[(16, true), (96, true), (256, true), (96, true), (256, true)],
        );

        assert_eq!(Strategy::FirstFit.find(&directory, 64), Some(nodes[1]));
        assert_eq!(Strategy::BestFit.find(&directory, 64), Some(nodes[1]));
        assert_eq!(Strategy::WorstFit.find(&directory, 64), Some(nodes[2]));
    }

    #[test]
    fn exact_fit_is_a_candidate() {
        let mut headers = Headers::new();
        let (directory, nodes) = directory(&mut headers, &[(48, true)]);

        for strategy in Strategy::ALL {
            assert_eq!(strategy.find(&directory, 48), Some(nodes[0]));
        }
    }

    #[test]
    fn nothing_fits() {
        let mut headers = Headers::new();
        let (directory, _) = directory(&mut headers, &[(64, true), (4096, false)]);

        for strategy in Strategy::ALL {
            assert_eq!(strategy.find(&directory, 80), None);
            assert_eq!(strategy.find(&Directory::new(), 16), None);
        }
    }

    #[test]
    fn parse_and_display() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.to_string().parse::<Strategy>(), Ok(strategy));
        }

        assert_eq!("BEST_FIT".parse::<Strategy>(), Ok(Strategy::BestFit));
        assert_eq!("worst".parse::<Strategy>(), Ok(Strategy::WorstFit));
        assert_eq!(
            "buddy".parse::<Strategy>(),
            Err(ParseStrategyError("buddy".to_owned()))
        );
        assert_eq!(Strategy::default(), Strategy::FirstFit);
    }
}
