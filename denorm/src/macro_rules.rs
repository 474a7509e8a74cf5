
/// Declares a [`MappingTree`](crate::mapping::MappingTree) with nested braces:
///
/// ```
/// let tree = denorm::mapping! {
///     branch: { company: { country: { name: branch_company_country_name } } }
/// };
/// assert_eq!(tree.flatten()[0].target, "branch_company_country_name");
/// ```
#[macro_export]
macro_rules! mapping {
    (@insert $tree:ident, $key:ident, { $($inner:tt)* }) => {
        $tree.insert(
            stringify!($key),
            $crate::mapping::MappingNode::Nested($crate::mapping! { $($inner)* }),
        );
    };
    (@insert $tree:ident, $key:ident, $target:ident) => {
        $tree.insert(
            stringify!($key),
            $crate::mapping::MappingNode::Target(stringify!($target).to_string()),
        );
    };
    ($($key:ident : $value:tt),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut tree = $crate::mapping::MappingTree::new();
        $( $crate::mapping!(@insert tree, $key, $value); )*
        tree
    }};
}

/// Declares the path-expression form, one `a.b.column == target` per line.
#[macro_export]
macro_rules! mapping_expressions {
    ($($first:ident $(. $rest:ident)* == $target:ident);* $(;)?) => {
        vec![$(
            $crate::mapping::FlatMapping::new(
                &[stringify!($first) $(, stringify!($rest))*],
                stringify!($target),
            )
        ),*]
    };
}
