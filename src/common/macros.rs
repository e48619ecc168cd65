//! Useful macros.

/// Given an ordered list of path components, combine them into a path string.
macro_rules! dir {
    ($first:expr $(, $part:expr)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut path = String::from($first);

        $(
            path.push('/');
            path.extend(String::from($part).chars());
        )*

        path
    }}
}

/// Run a bunch of commands with the same shell and optionally the same CWD.
macro_rules! with_shell {
    ($shell:ident $(in $cwd:expr)? => $($cmd:expr),+ $(,)?) => {{
        let cmds = vec![$($cmd),+];

        $(
            let cmds: Vec<_> = cmds.into_iter().map(|cmd| cmd.cwd($cwd)).collect();
        )?

        for cmd in cmds.into_iter() {
            $shell.run(cmd)?;
        }
    }}
}
