//! Union-find over transcript indices, the clustering primitive of the
//! redundancy filter: similarity-search hits are edges, clusters are the
//! connected components.

#[derive(Debug, Clone, Default)]
pub struct FindUnion {
    /// parents[i] = j means node j represents the component node i resides in.
    parents: Vec<usize>,
    /// Component size, valid only at the representative.
    sizes: Vec<Option<usize>>,
    length: usize,
}

impl FindUnion {
    pub fn new(size: usize) -> Self {
        let parents = (0..size).collect();
        let sizes = (0..size).map(|_| Some(1)).collect();
        FindUnion {
            parents,
            sizes,
            length: size,
        }
    }
    /// Representative of the component `index` resides in, with path
    /// compression. None when out of range.
    pub fn find(&mut self, index: usize) -> Option<usize> {
        if index >= self.length {
            return None;
        }
        let parent = {
            let mut temp = index;
            while temp != self.parents[temp] {
                temp = self.parents[temp];
            }
            temp
        };
        let mut index = index;
        while index != parent {
            let next = self.parents[index];
            self.parents[index] = parent;
            index = next;
        }
        Some(parent)
    }
    /// Merge the components of the two nodes (union by size).
    pub fn unite(&mut self, node1: usize, node2: usize) -> Option<()> {
        if node1 >= self.length || node2 >= self.length {
            None
        } else if node1 == node2 {
            Some(())
        } else {
            let parent1 = self.find(node1)?;
            let parent2 = self.find(node2)?;
            if parent1 != parent2 {
                if self.sizes[parent1] > self.sizes[parent2] {
                    self.parents[parent2] = parent1;
                    self.sizes[parent1] = Some(self.sizes[parent1]? + self.sizes[parent2]?);
                    self.sizes[parent2] = None;
                } else {
                    self.parents[parent1] = parent2;
                    self.sizes[parent2] = Some(self.sizes[parent1]? + self.sizes[parent2]?);
                    self.sizes[parent1] = None;
                }
            }
            Some(())
        }
    }
    pub fn same(&mut self, node1: usize, node2: usize) -> Option<bool> {
        if node1 >= self.length || node2 >= self.length {
            None
        } else {
            Some(self.find(node1) == self.find(node2))
        }
    }
}
