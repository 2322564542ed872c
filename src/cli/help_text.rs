pub(super) const ROOT_LONG_ABOUT: &str = "\
Track file identity across two directory trees and replay renames

renametree keeps the two copies of a tree in step as far as names go. It notices
when a file or directory was renamed or moved in one copy and performs the same
rename in the other copy, so that a later content sync does not see a deletion
plus a new file.

CORE CONCEPTS:

  Identity:
    Every file, directory and symlink gets an opaque identifier the first time it
    is scanned. The identifier follows the inode, so it survives renames and moves
    within the same filesystem.

  Index file:
    Each root keeps a .renametree-<inode>.v0.idx file at its top level. It maps
    inode numbers to identities and keeps the full path history of every identity,
    one record per observed location.

  Bootstrapping:
    While one root is scanned, an entry with no identity yet takes the identity
    the other root already tracks at the same path. Two copies of the same tree
    therefore agree on identities from their first run.

  Reconciliation:
    For every identity both roots know, the path histories are compared. If only
    one root moved it since they last agreed, the other root is stale and the
    rename is replayed there. If both moved it, the identity is reported as a
    conflict and left alone.

TYPICAL WORKFLOW:

  1. Run once on two trees that start out identical:
     $ renametree /data/laptop /data/backup

  2. Rename and move files in either tree.

  3. Preview what would be replayed:
     $ renametree --dry-run /data/laptop /data/backup

  4. Replay the renames, then sync contents with your usual tool:
     $ renametree /data/laptop /data/backup
     $ rsync -a /data/laptop/ /data/backup/

OUTPUT:

  Renames and conflicts are printed on stdout, one per line:

    rename in <root>: <from> -> <to>
    conflict <id>: <root_a>/<path> vs <root_b>/<path> (diverged since <time>)
    conflict at <path>: <id_a> in <root_a>, <id_b> in <root_b>

  Diagnostics go to stderr.

EXIT STATUS:

  0    Success (conflicts are reported but do not fail the run)
  1    With --strict: conflicts or recoverable errors were found
  255  A root could not be opened, scanned or saved, or invalid arguments
";
